//! `Airmap` Offload — background transform contexts with deadline-bounded
//! dispatch and an always-succeeding synchronous fallback.

pub mod demo;
pub mod offload;
pub mod telemetry;

pub use offload::{
    build_offload_pipeline, DispatchError, FallbackReason, OffloadConfig, OffloadService, Outcome,
};
