//! Metrics middleware for offload calls.
//!
//! Wraps each call in an `offload` span carrying the category, record count,
//! duration, and the path (background or fallback) that produced the result.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use airmap_core::messages::{TransformResult, WorkPayload};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::offload::outcome::Outcome;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments offload calls with timing and path via `tracing` spans.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records offload duration and path in tracing spans.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<WorkPayload> for MetricsService<S>
where
    S: Service<WorkPayload, Response = Outcome<TransformResult>> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Outcome<TransformResult>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, payload: WorkPayload) -> Self::Future {
        let category = payload.category().as_str();
        let records = payload.len();

        let span = info_span!(
            "offload",
            category = category,
            records = records,
            duration_ms = tracing::field::Empty,
            path = tracing::field::Empty,
        );

        let fut = self.inner.call(payload);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let path = match &result {
                    Ok(outcome) => outcome.path(),
                    Err(_) => "error",
                };
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("path", path);

                tracing::info!(
                    category = category,
                    records = records,
                    duration_ms = duration_ms,
                    path = path,
                    "offload complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
