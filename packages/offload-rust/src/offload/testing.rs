//! Scripted contexts for exercising dispatch and fallback paths.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use airmap_core::codec;
use airmap_core::messages::{TaskCategory, TransformResult, WorkPayload, WorkRequest, WorkResponse};
use airmap_core::transform;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::context::{ContextEvent, ContextPort, ContextSpawner, SpawnError};
use super::worker::TokioContextSpawner;

/// How a scripted context answers `Process` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    /// Answers with the real transform.
    Echo,
    /// Never answers.
    Silent,
    /// Answers every request with a failure response.
    Fail,
    /// Emits a context-level fault instead of answering.
    Fault,
    /// Exits as soon as it starts.
    Exit,
    /// Answers with a result of the other category.
    WrongCategory,
    /// Answers with a frame that is not a valid response.
    Garbage,
}

/// Spawns tokio tasks that follow a [`Behavior`] and record what they receive.
///
/// Clones share their counters, so a clone kept by the test observes the
/// spawner handed to the service.
#[derive(Clone)]
pub(crate) struct ScriptedSpawner {
    behavior: Behavior,
    spawned: Arc<AtomicU32>,
    received: Arc<Mutex<Vec<WorkRequest>>>,
}

impl ScriptedSpawner {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            spawned: Arc::new(AtomicU32::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Count of contexts created so far.
    pub(crate) fn spawned(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.spawned)
    }

    /// Every request decoded by any context of this spawner, in arrival order.
    pub(crate) fn received(&self) -> Arc<Mutex<Vec<WorkRequest>>> {
        Arc::clone(&self.received)
    }
}

fn wrong_result(payload: &WorkPayload) -> TransformResult {
    match payload.category() {
        TaskCategory::Heatmap => TransformResult::Forecast(vec![]),
        TaskCategory::Forecast => TransformResult::Heatmap(vec![]),
    }
}

fn message(response: &WorkResponse) -> ContextEvent {
    ContextEvent::Message(codec::encode_response(response).expect("encode response"))
}

impl ContextSpawner for ScriptedSpawner {
    fn spawn(&self, _category: TaskCategory, capacity: usize) -> Result<ContextPort, SpawnError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;
        let (frames_tx, mut frames_rx) = mpsc::channel::<Vec<u8>>(capacity.max(1));
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        let behavior = self.behavior;
        let received = Arc::clone(&self.received);

        let task = runtime.spawn(async move {
            if behavior == Behavior::Exit {
                return;
            }
            while let Some(frame) = frames_rx.recv().await {
                let request = match codec::decode_request(&frame) {
                    Ok(request) => request,
                    Err(e) => {
                        let _ = events_tx.send(ContextEvent::Fault(e.to_string())).await;
                        continue;
                    }
                };
                received.lock().push(request.clone());

                let WorkRequest::Process { id, payload } = request else {
                    continue;
                };
                let event = match behavior {
                    Behavior::Echo => message(&WorkResponse::success(id, transform::run(&payload))),
                    Behavior::Fail => message(&WorkResponse::failure(id, "scripted failure")),
                    Behavior::Fault => ContextEvent::Fault("scripted fault".to_string()),
                    Behavior::WrongCategory => {
                        message(&WorkResponse::success(id, wrong_result(&payload)))
                    }
                    Behavior::Garbage => ContextEvent::Message(b"\xc1garbage".to_vec()),
                    Behavior::Silent | Behavior::Exit => continue,
                };
                if events_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(ContextPort {
            frames: frames_tx,
            events: events_rx,
            shutdown: None,
            task: Some(task),
        })
    }
}

/// The real spawner, counting constructions.
#[derive(Default)]
pub(crate) struct CountingSpawner {
    inner: TokioContextSpawner,
    spawned: Arc<AtomicU32>,
}

impl CountingSpawner {
    pub(crate) fn spawned(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.spawned)
    }
}

impl ContextSpawner for CountingSpawner {
    fn spawn(&self, category: TaskCategory, capacity: usize) -> Result<ContextPort, SpawnError> {
        let port = self.inner.spawn(category, capacity)?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(port)
    }
}

/// Refuses every spawn, as an environment without background support would.
pub(crate) struct RefusingSpawner;

impl ContextSpawner for RefusingSpawner {
    fn spawn(&self, _category: TaskCategory, _capacity: usize) -> Result<ContextPort, SpawnError> {
        Err(SpawnError::Failed("resource limit reached".to_string()))
    }
}
