//! Default background context.
//!
//! `TokioContextSpawner` starts a `ContextWorker` task per context. The worker
//! decodes request frames, queues them, and runs one transform at a time on the
//! blocking pool so bulk work never stalls the async runtime. Only encoded frames
//! and events cross the boundary.

use std::any::Any;
use std::collections::VecDeque;

use airmap_core::codec;
use airmap_core::messages::{TaskCategory, TransformResult, WorkPayload, WorkRequest, WorkResponse};
use airmap_core::transform;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};

use super::context::{ContextEvent, ContextPort, ContextSpawner, SpawnError};

/// The transform a worker runs for each request.
pub type TransformFn = fn(&WorkPayload) -> TransformResult;

// ---------------------------------------------------------------------------
// TokioContextSpawner
// ---------------------------------------------------------------------------

/// Spawns worker contexts on the current tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct TokioContextSpawner {
    transform: TransformFn,
}

impl TokioContextSpawner {
    /// A spawner whose contexts run `airmap_core::transform::run`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transform: transform::run,
        }
    }

    /// A spawner whose contexts run `transform` instead.
    #[must_use]
    pub fn with_transform(transform: TransformFn) -> Self {
        Self { transform }
    }
}

impl Default for TokioContextSpawner {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSpawner for TokioContextSpawner {
    fn spawn(&self, category: TaskCategory, capacity: usize) -> Result<ContextPort, SpawnError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;
        let capacity = capacity.max(1);
        let (frames_tx, frames_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = ContextWorker {
            category,
            transform: self.transform,
            capacity,
            frames: frames_rx,
            events: events_tx,
            queue: VecDeque::new(),
            running: None,
        };
        let task = runtime.spawn(worker.run(shutdown_rx));

        Ok(ContextPort {
            frames: frames_tx,
            events: events_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

// ---------------------------------------------------------------------------
// ContextWorker
// ---------------------------------------------------------------------------

struct RunningJob {
    id: u64,
    cancelled: bool,
    handle: JoinHandle<TransformResult>,
}

struct ContextWorker {
    category: TaskCategory,
    transform: TransformFn,
    /// Most requests held at once, running one included.
    capacity: usize,
    frames: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<ContextEvent>,
    queue: VecDeque<(u64, WorkPayload)>,
    running: Option<RunningJob>,
}

impl ContextWorker {
    /// Serve frames until shutdown, until the frame channel closes, or until
    /// nobody listens for events any more.
    ///
    /// Frames are only read while fewer than `capacity` requests are held, so
    /// a slow transform backs up into the bounded frame channel and senders wait.
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        tracing::debug!(category = %self.category, "background context started");

        loop {
            self.start_next();
            let has_job = self.running.is_some();
            let has_room = self.held() < self.capacity;

            tokio::select! {
                _ = &mut shutdown => break,
                finished = join_running(&mut self.running), if has_job => {
                    self.running = None;
                    if let Some((id, cancelled, result)) = finished {
                        if !self.finish(id, cancelled, result).await {
                            break;
                        }
                    }
                }
                frame = self.frames.recv(), if has_room => {
                    match frame {
                        Some(frame) => {
                            if !self.accept(&frame).await {
                                break;
                            }
                        }
                        None => break, // Channel closed.
                    }
                }
            }
        }

        if let Some(job) = self.running.take() {
            job.handle.abort();
        }
        tracing::debug!(category = %self.category, queued = self.queue.len(), "background context stopped");
    }

    fn held(&self) -> usize {
        self.queue.len() + usize::from(self.running.is_some())
    }

    fn start_next(&mut self) {
        if self.running.is_some() {
            return;
        }
        if let Some((id, payload)) = self.queue.pop_front() {
            let transform = self.transform;
            let handle = tokio::task::spawn_blocking(move || transform(&payload));
            self.running = Some(RunningJob {
                id,
                cancelled: false,
                handle,
            });
        }
    }

    /// Handle one inbound frame. Returns `false` once events can no longer be delivered.
    async fn accept(&mut self, frame: &[u8]) -> bool {
        match codec::decode_request(frame) {
            Ok(WorkRequest::Process { id, payload }) => {
                self.queue.push_back((id, payload));
                true
            }
            Ok(WorkRequest::Cancel { id }) => {
                self.cancel(id);
                true
            }
            Err(e) => {
                let event = ContextEvent::Fault(format!("undecodable request frame: {e:#}"));
                self.events.send(event).await.is_ok()
            }
        }
    }

    fn cancel(&mut self, id: u64) {
        if let Some(job) = self.running.as_mut().filter(|job| job.id == id) {
            // The blocking transform cannot be interrupted; its result is dropped instead.
            job.cancelled = true;
            tracing::debug!(category = %self.category, id, "cancelled running request");
            return;
        }
        let before = self.queue.len();
        self.queue.retain(|(queued, _)| *queued != id);
        if self.queue.len() < before {
            tracing::debug!(category = %self.category, id, "cancelled queued request");
        }
    }

    /// Post the outcome of a finished job. Returns `false` once events can no longer be delivered.
    async fn finish(
        &mut self,
        id: u64,
        cancelled: bool,
        result: Result<TransformResult, JoinError>,
    ) -> bool {
        if cancelled {
            tracing::debug!(category = %self.category, id, "dropping result of cancelled request");
            return true;
        }

        let response = match result {
            Ok(result) => WorkResponse::success(id, result),
            Err(e) => {
                let message = if e.is_panic() {
                    format!("transform panicked: {}", panic_message(&*e.into_panic()))
                } else {
                    "transform was aborted".to_string()
                };
                tracing::warn!(category = %self.category, id, %message, "transform failed");
                WorkResponse::failure(id, message)
            }
        };

        let event = match codec::encode_response(&response) {
            Ok(frame) => ContextEvent::Message(frame),
            Err(e) => ContextEvent::Fault(format!("{e:#}")),
        };
        self.events.send(event).await.is_ok()
    }
}

async fn join_running(
    running: &mut Option<RunningJob>,
) -> Option<(u64, bool, Result<TransformResult, JoinError>)> {
    let job = running.as_mut()?;
    let result = (&mut job.handle).await;
    Some((job.id, job.cancelled, result))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
