use std::time::Duration;

/// Configuration for the offload service.
///
/// Controls the dispatch deadline, the depth of each context's request queue,
/// and whether failed dispatches tear down the cached context.
#[derive(Debug, Clone)]
pub struct OffloadConfig {
    /// How long a dispatch waits for its response before falling back, in milliseconds.
    pub dispatch_timeout_ms: u64,
    /// Bounded mpsc capacity for request frames and events per context. A
    /// context also holds at most this many requests, the running one included.
    pub channel_capacity: usize,
    /// Release the cached context after a context fault, so the next call
    /// starts from a fresh one.
    pub release_on_fault: bool,
    /// Release the cached context after a dispatch timeout.
    pub release_on_timeout: bool,
}

impl OffloadConfig {
    /// The dispatch deadline as a `Duration`.
    #[must_use]
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: 30_000,
            channel_capacity: 256,
            release_on_fault: true,
            release_on_timeout: false,
        }
    }
}
