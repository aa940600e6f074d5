//! Pipeline composition: wraps the offload service in its middleware stack.

use tower::ServiceBuilder;

use super::metrics::{MetricsLayer, MetricsService};
use crate::offload::service::OffloadService;

/// Build the offload pipeline around `service`.
///
/// The deadline is enforced inside the service itself, so the only layer here
/// is `MetricsLayer`. The returned service implements `tower::Service<WorkPayload>`
/// and never returns an error.
#[must_use]
pub fn build_offload_pipeline(service: OffloadService) -> MetricsService<OffloadService> {
    ServiceBuilder::new().layer(MetricsLayer).service(service)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use airmap_core::messages::WorkPayload;
    use airmap_core::transform;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::offload::config::OffloadConfig;
    use crate::offload::testing::RefusingSpawner;

    fn forecast() -> WorkPayload {
        serde_json::from_value(json!({
            "type": "processForecast",
            "data": [{ "timestamp": "2024-01-01T00:00:00Z", "conditions": { "humidity": "71" } }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn pipeline_runs_background_path() {
        let svc = build_offload_pipeline(OffloadService::new(OffloadConfig::default()));

        let payload = forecast();
        let outcome = svc.oneshot(payload.clone()).await.unwrap();
        assert_eq!(outcome.path(), "background");
        assert_eq!(outcome.into_inner(), transform::run(&payload));
    }

    #[tokio::test]
    async fn pipeline_falls_back_when_unavailable() {
        let service = OffloadService::with_spawner(OffloadConfig::default(), Arc::new(RefusingSpawner));
        let svc = build_offload_pipeline(service);

        let payload = forecast();
        let outcome = svc.oneshot(payload.clone()).await.unwrap();
        assert_eq!(outcome.path(), "fallback");
        assert_eq!(outcome.into_inner(), transform::run(&payload));
    }
}
