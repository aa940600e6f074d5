//! Task offload: background transform contexts with synchronous fallback.
//!
//! 1. **Contexts** (`context`, `worker`): one lazily created context per `TaskCategory`
//! 2. **Dispatch** (`dispatch`): id-correlated request/response with a deadline
//! 3. **Service** (`service`): the never-failing offload operation
//! 4. **Middleware** (`middleware`): Tower layers around the service

pub mod config;
pub mod context;
pub mod dispatch;
pub mod middleware;
pub mod outcome;
pub mod service;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenient access.
pub use config::OffloadConfig;
pub use context::{
    ContextEvent, ContextHandle, ContextManager, ContextPort, ContextSpawner, SpawnError,
    Unavailable,
};
pub use dispatch::{dispatch, DispatchError};
pub use middleware::{build_offload_pipeline, MetricsLayer};
pub use outcome::{FallbackReason, Outcome};
pub use service::OffloadService;
pub use worker::{TokioContextSpawner, TransformFn};
