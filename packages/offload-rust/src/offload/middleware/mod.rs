//! Tower middleware for the offload pipeline.
//!
//! - [`metrics`]: Offload timing and path via `tracing` spans
//! - [`pipeline`]: Composes the layers around `OffloadService`

pub mod metrics;
pub mod pipeline;

pub use metrics::{MetricsLayer, MetricsService};
pub use pipeline::build_offload_pipeline;
