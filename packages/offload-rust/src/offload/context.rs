//! Background execution contexts and the manager that caches them.
//!
//! A context is reached only through its [`ContextPort`]: request frames go in,
//! [`ContextEvent`]s come out. [`ContextHandle`] wraps a port with a listener task
//! that routes response frames to waiting dispatches by request id, and fans
//! context-level faults out to every dispatch still waiting.
//!
//! [`ContextManager`] owns at most one live handle per [`TaskCategory`], creates
//! it lazily on first use, and converts creation failure into [`Unavailable`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use airmap_core::codec;
use airmap_core::messages::{TaskCategory, WorkRequest, WorkResponse};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Port and spawner
// ---------------------------------------------------------------------------

/// Something a background context emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEvent {
    /// An encoded `WorkResponse` frame.
    Message(Vec<u8>),
    /// A fault not tied to any single request (e.g. an undecodable frame).
    Fault(String),
}

/// The caller's side of a freshly spawned context.
#[derive(Debug)]
pub struct ContextPort {
    /// Request frames into the context.
    pub frames: mpsc::Sender<Vec<u8>>,
    /// Events out of the context. Closing this channel means the context exited.
    pub events: mpsc::Receiver<ContextEvent>,
    /// Asks the context to stop.
    pub shutdown: Option<oneshot::Sender<()>>,
    /// The task running the context, aborted on termination.
    pub task: Option<JoinHandle<()>>,
}

/// Errors from creating a context.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("no async runtime available to host a background context")]
    NoRuntime,
    #[error("failed to start background context: {0}")]
    Failed(String),
}

/// Creates background contexts.
///
/// The default implementation is `TokioContextSpawner`; tests substitute
/// spawners that count constructions or misbehave on purpose.
pub trait ContextSpawner: Send + Sync + 'static {
    /// Start a context for `category` whose channels hold `capacity` messages.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` when the environment cannot host a context.
    fn spawn(&self, category: TaskCategory, capacity: usize) -> Result<ContextPort, SpawnError>;
}

/// A context could not be created; callers fall back to inline execution.
#[derive(Debug, thiserror::Error)]
#[error("background context for {category} unavailable: {source}")]
pub struct Unavailable {
    pub category: TaskCategory,
    #[source]
    pub source: SpawnError,
}

// ---------------------------------------------------------------------------
// ContextHandle
// ---------------------------------------------------------------------------

/// What a waiting dispatch receives.
#[derive(Debug)]
pub(crate) enum Reply {
    Response(WorkResponse),
    Fault(String),
}

type PendingMap = DashMap<u64, oneshot::Sender<Reply>>;

/// A cached, shareable reference to one live context.
///
/// Cloning is cheap; all clones talk to the same context.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    category: TaskCategory,
    generation: u64,
    frames: mpsc::Sender<Vec<u8>>,
    pending: Arc<PendingMap>,
    next_request_id: AtomicU64,
    listener: JoinHandle<()>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    terminated: AtomicBool,
}

impl ContextHandle {
    /// Wrap a port, starting the listener that routes its events.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::NoRuntime` when called outside a tokio runtime.
    pub fn attach(
        category: TaskCategory,
        generation: u64,
        port: ContextPort,
    ) -> Result<Self, SpawnError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;
        let pending = Arc::new(PendingMap::new());
        let listener = runtime.spawn(listen(category, port.events, Arc::clone(&pending)));

        Ok(Self {
            inner: Arc::new(ContextInner {
                category,
                generation,
                frames: port.frames,
                pending,
                next_request_id: AtomicU64::new(1),
                listener,
                shutdown: Mutex::new(port.shutdown),
                task: Mutex::new(port.task),
                terminated: AtomicBool::new(false),
            }),
        })
    }

    #[must_use]
    pub fn category(&self) -> TaskCategory {
        self.inner.category
    }

    /// Distinguishes successive contexts of the same category.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    /// Whether the context can still accept and answer requests.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.inner.terminated.load(Ordering::Acquire)
            && !self.inner.frames.is_closed()
            && !self.inner.listener.is_finished()
    }

    /// Number of dispatches currently waiting on this context.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        self.inner.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register interest in the response to `id`. Must happen before the
    /// request is posted, so an early reply always finds its receiver.
    pub(crate) fn register(&self, id: u64) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);
        rx
    }

    pub(crate) fn forget(&self, id: u64) {
        self.inner.pending.remove(&id);
    }

    /// Post a request frame, waiting for queue space.
    pub(crate) async fn post(&self, frame: Vec<u8>) -> Result<(), mpsc::error::SendError<Vec<u8>>> {
        self.inner.frames.send(frame).await
    }

    /// Tell the context to abandon `id`. Best effort: dropped if the queue is full.
    pub(crate) fn cancel(&self, id: u64) {
        let frame = match codec::encode_request(&WorkRequest::Cancel { id }) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(category = %self.inner.category, id, error = %e, "failed to encode cancel");
                return;
            }
        };
        if let Err(e) = self.inner.frames.try_send(frame) {
            tracing::debug!(category = %self.inner.category, id, error = %e, "cancel not delivered");
        }
    }

    /// Stop the context. Waiting dispatches observe a fault. Idempotent.
    pub fn terminate(&self) {
        self.inner.terminate();
    }
}

impl ContextInner {
    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(tx) = self.shutdown.lock().take() {
            // Ignore send errors -- the context may already have exited.
            let _ = tx.send(());
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.listener.abort();
        // Dropping the senders wakes every waiting dispatch.
        self.pending.clear();
        tracing::debug!(category = %self.category, generation = self.generation, "background context terminated");
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Routes context events to waiting dispatches until the context exits.
async fn listen(
    category: TaskCategory,
    mut events: mpsc::Receiver<ContextEvent>,
    pending: Arc<PendingMap>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ContextEvent::Message(frame) => match codec::decode_response(&frame) {
                Ok(response) => {
                    let id = response.id();
                    match pending.remove(&id) {
                        Some((_, tx)) => {
                            let _ = tx.send(Reply::Response(response));
                        }
                        None => {
                            tracing::debug!(%category, id, "discarding response nobody is waiting for");
                        }
                    }
                }
                Err(e) => {
                    // The id is unreadable, so every waiting dispatch is failed.
                    let message = format!("undecodable response frame: {e:#}");
                    tracing::warn!(%category, %message, "background context fault");
                    fail_all(&pending, &message);
                }
            },
            ContextEvent::Fault(message) => {
                tracing::warn!(%category, %message, "background context fault");
                fail_all(&pending, &message);
            }
        }
    }
    fail_all(&pending, "background context exited");
}

fn fail_all(pending: &PendingMap, message: &str) {
    let ids: Vec<u64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Reply::Fault(message.to_string()));
        }
    }
}

// ---------------------------------------------------------------------------
// ContextManager
// ---------------------------------------------------------------------------

/// Lazily creates, caches, and tears down one context per category.
pub struct ContextManager {
    spawner: Arc<dyn ContextSpawner>,
    capacity: usize,
    contexts: Mutex<HashMap<TaskCategory, ContextHandle>>,
    generation: AtomicU64,
}

impl ContextManager {
    #[must_use]
    pub fn new(spawner: Arc<dyn ContextSpawner>, capacity: usize) -> Self {
        Self {
            spawner,
            capacity,
            contexts: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(1),
        }
    }

    /// Return the cached context for `category`, creating one if there is none
    /// or the cached one has exited.
    ///
    /// Creation runs under the cache lock, so concurrent first use creates
    /// exactly one context.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the context cannot be created.
    pub fn acquire(&self, category: TaskCategory) -> Result<ContextHandle, Unavailable> {
        let mut contexts = self.contexts.lock();

        if let Some(handle) = contexts.get(&category) {
            if handle.is_alive() {
                return Ok(handle.clone());
            }
            tracing::debug!(%category, generation = handle.generation(), "cached context exited, recreating");
            if let Some(stale) = contexts.remove(&category) {
                stale.terminate();
            }
        }

        let port = self
            .spawner
            .spawn(category, self.capacity)
            .map_err(|source| Unavailable { category, source })?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let handle = ContextHandle::attach(category, generation, port)
            .map_err(|source| Unavailable { category, source })?;

        tracing::debug!(%category, generation, "background context created");
        contexts.insert(category, handle.clone());
        Ok(handle)
    }

    /// Terminate and forget the context for `category`, if any.
    pub fn release(&self, category: TaskCategory) {
        let removed = self.contexts.lock().remove(&category);
        if let Some(handle) = removed {
            handle.terminate();
        }
    }

    /// Like `release`, but only if `handle` is still the cached context, so a
    /// late failure on an old context never tears down its replacement.
    pub fn release_handle(&self, handle: &ContextHandle) {
        let mut contexts = self.contexts.lock();
        let is_current = contexts
            .get(&handle.category())
            .is_some_and(|cached| cached.generation() == handle.generation());
        if is_current {
            contexts.remove(&handle.category());
        }
        drop(contexts);
        handle.terminate();
    }

    /// Terminate every cached context. Idempotent.
    pub fn release_all(&self) {
        let drained: Vec<ContextHandle> = self.contexts.lock().drain().map(|(_, h)| h).collect();
        for handle in drained {
            handle.terminate();
        }
    }

    /// Whether a live context is cached for `category`.
    #[must_use]
    pub fn is_live(&self, category: TaskCategory) -> bool {
        self.contexts
            .lock()
            .get(&category)
            .is_some_and(ContextHandle::is_alive)
    }

    /// Generation of the cached context for `category`, if any.
    #[must_use]
    pub fn generation(&self, category: TaskCategory) -> Option<u64> {
        self.contexts.lock().get(&category).map(ContextHandle::generation)
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("capacity", &self.capacity)
            .field("contexts", &self.contexts.lock().len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
