//! The offload operation: background dispatch with synchronous fallback.
//!
//! `OffloadService` owns the context manager and the dispatch deadline. Every
//! call settles with a value: when the background path is unavailable or
//! fails, the same transform runs inline and its result is returned instead.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use airmap_core::messages::{TaskCategory, TransformResult, WorkPayload};
use airmap_core::{transform, ForecastEntry, ForecastRecord, GeoFeature, HeatmapPoint};
use tower::Service;

use super::config::OffloadConfig;
use super::context::{ContextManager, ContextSpawner};
use super::dispatch::{dispatch, DispatchError};
use super::outcome::{FallbackReason, Outcome};
use super::worker::TokioContextSpawner;

/// Offloads transforms to one cached background context per category.
///
/// Construct once per process; clones share the same contexts. Call
/// [`OffloadService::dispose`] at shutdown. Dropping the last clone does the same.
#[derive(Clone)]
pub struct OffloadService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: OffloadConfig,
    contexts: ContextManager,
}

impl OffloadService {
    /// A service whose contexts run on the current tokio runtime.
    #[must_use]
    pub fn new(config: OffloadConfig) -> Self {
        Self::with_spawner(config, Arc::new(TokioContextSpawner::new()))
    }

    /// A service whose contexts come from `spawner`.
    #[must_use]
    pub fn with_spawner(config: OffloadConfig, spawner: Arc<dyn ContextSpawner>) -> Self {
        let contexts = ContextManager::new(spawner, config.channel_capacity);
        Self {
            inner: Arc::new(ServiceInner { config, contexts }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &OffloadConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn contexts(&self) -> &ContextManager {
        &self.inner.contexts
    }

    /// Transform `payload`, preferring the background context. Never fails.
    pub async fn offload(&self, payload: &WorkPayload) -> TransformResult {
        self.offload_with_outcome(payload).await.into_inner()
    }

    /// Like [`OffloadService::offload`], but reports which path produced the result.
    pub async fn offload_with_outcome(&self, payload: &WorkPayload) -> Outcome<TransformResult> {
        let category = payload.category();

        let handle = match self.inner.contexts.acquire(category) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::debug!(%category, error = %e, "background context unavailable, transforming inline");
                return fallback(payload, e.into());
            }
        };

        match dispatch(&handle, payload, self.inner.config.dispatch_timeout()).await {
            Ok(result) => {
                metrics::counter!("offload_background_total", "category" => category.as_str())
                    .increment(1);
                Outcome::Background(result)
            }
            Err(e) => {
                tracing::warn!(
                    %category,
                    reason = e.kind(),
                    error = %e,
                    "background dispatch failed, falling back to synchronous transform"
                );
                if self.releases_after(&e) {
                    self.inner.contexts.release_handle(&handle);
                }
                fallback(payload, e.into())
            }
        }
    }

    /// Heatmap points for `features`. Never fails.
    pub async fn heatmap(&self, features: Vec<GeoFeature>) -> Vec<HeatmapPoint> {
        let payload = WorkPayload::Heatmap(features);
        self.offload(&payload).await.into_heatmap().unwrap_or_default()
    }

    /// Normalized forecast records for `entries`. Never fails.
    pub async fn forecast(&self, entries: Vec<ForecastEntry>) -> Vec<ForecastRecord> {
        let payload = WorkPayload::Forecast(entries);
        self.offload(&payload).await.into_forecast().unwrap_or_default()
    }

    /// Terminate every cached context. Safe to call repeatedly, or before any
    /// context was created; a later call creates fresh contexts on demand.
    pub fn dispose(&self) {
        self.inner.contexts.release_all();
        tracing::debug!("offload service disposed");
    }

    /// Whether a live context is cached for `category`.
    #[must_use]
    pub fn is_live(&self, category: TaskCategory) -> bool {
        self.inner.contexts.is_live(category)
    }

    fn releases_after(&self, error: &DispatchError) -> bool {
        match error {
            DispatchError::ContextFault { .. } => self.inner.config.release_on_fault,
            DispatchError::Timeout { .. } => self.inner.config.release_on_timeout,
            DispatchError::Remote { .. } | DispatchError::Codec(_) => false,
        }
    }
}

fn fallback(payload: &WorkPayload, reason: FallbackReason) -> Outcome<TransformResult> {
    metrics::counter!(
        "offload_fallback_total",
        "category" => payload.category().as_str(),
        "reason" => reason.kind()
    )
    .increment(1);
    Outcome::Fallback {
        result: transform::run(payload),
        reason,
    }
}

impl Drop for ServiceInner {
    fn drop(&mut self) {
        self.contexts.release_all();
    }
}

impl std::fmt::Debug for OffloadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadService")
            .field("config", &self.inner.config)
            .field("contexts", &self.inner.contexts)
            .finish()
    }
}

impl Service<WorkPayload> for OffloadService {
    type Response = Outcome<TransformResult>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, payload: WorkPayload) -> Self::Future {
        let svc = self.clone();
        Box::pin(async move { Ok(svc.offload_with_outcome(&payload).await) })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
