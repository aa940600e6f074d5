//! Message schemas exchanged with a background execution context.
//!
//! Requests carry a payload shaped `{ "type": "processHeatmap" | "processForecast", "data": [...] }`
//! and a request id; responses are `{ id, success, result?, error? }`. Ids let a
//! single context serve overlapping requests: responses are routed by id, never
//! by arrival order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::forecast::{ForecastEntry, ForecastRecord};
use crate::geo::{GeoFeature, HeatmapPoint};

// ---------------------------------------------------------------------------
// TaskCategory
// ---------------------------------------------------------------------------

/// Selects the transform and the cached context a request uses.
///
/// Adding a category means adding a variant here, a payload/result variant
/// below, and a branch in `transform::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskCategory {
    #[serde(rename = "heatmap-transform")]
    Heatmap,
    #[serde(rename = "forecast-normalize")]
    Forecast,
}

impl TaskCategory {
    pub const ALL: [Self; 2] = [Self::Heatmap, Self::Forecast];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heatmap => "heatmap-transform",
            Self::Forecast => "forecast-normalize",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// WorkPayload / TransformResult
// ---------------------------------------------------------------------------

/// The raw input records of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WorkPayload {
    #[serde(rename = "processHeatmap")]
    Heatmap(Vec<GeoFeature>),
    #[serde(rename = "processForecast")]
    Forecast(Vec<ForecastEntry>),
}

impl WorkPayload {
    #[must_use]
    pub fn category(&self) -> TaskCategory {
        match self {
            Self::Heatmap(_) => TaskCategory::Heatmap,
            Self::Forecast(_) => TaskCategory::Forecast,
        }
    }

    /// Number of input records.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Heatmap(features) => features.len(),
            Self::Forecast(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalized output records, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "camelCase")]
pub enum TransformResult {
    Heatmap(Vec<HeatmapPoint>),
    Forecast(Vec<ForecastRecord>),
}

impl TransformResult {
    #[must_use]
    pub fn category(&self) -> TaskCategory {
        match self {
            Self::Heatmap(_) => TaskCategory::Heatmap,
            Self::Forecast(_) => TaskCategory::Forecast,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Heatmap(points) => points.len(),
            Self::Forecast(records) => records.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn into_heatmap(self) -> Option<Vec<HeatmapPoint>> {
        match self {
            Self::Heatmap(points) => Some(points),
            Self::Forecast(_) => None,
        }
    }

    #[must_use]
    pub fn into_forecast(self) -> Option<Vec<ForecastRecord>> {
        match self {
            Self::Forecast(records) => Some(records),
            Self::Heatmap(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkRequest / WorkResponse
// ---------------------------------------------------------------------------

/// A message sent to a background context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkRequest {
    /// Run the transform for `payload` and answer with a response carrying `id`.
    Process { id: u64, payload: WorkPayload },
    /// The sender stopped waiting for `id`; drop it if still queued and never answer it.
    Cancel { id: u64 },
}

impl WorkRequest {
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::Process { id, .. } | Self::Cancel { id } => *id,
        }
    }
}

/// A message sent back by a background context.
///
/// Exactly one of `result` and `error` is populated. The fields are private so
/// that only [`WorkResponse::success`] and [`WorkResponse::failure`] can build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResponse {
    id: u64,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    result: Option<TransformResult>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    error: Option<String>,
}

impl WorkResponse {
    #[must_use]
    pub fn success(id: u64, result: TransformResult) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Converts into a `Result`, the error being the message the context reported.
    ///
    /// # Errors
    ///
    /// Returns the carried error string for failure responses, and a
    /// descriptive message for a frame that claims success without a result.
    pub fn into_result(self) -> Result<TransformResult, String> {
        match (self.success, self.result, self.error) {
            (true, Some(result), _) => Ok(result),
            (true, None, _) => Err("success response without a result".to_string()),
            (false, _, Some(error)) => Err(error),
            (false, _, None) => Err("failure response without an error".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_uses_process_message_names() {
        let payload = WorkPayload::Heatmap(vec![]);
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "type": "processHeatmap", "data": [] })
        );

        let payload: WorkPayload = serde_json::from_value(json!({
            "type": "processForecast",
            "data": [{ "timestamp": "t0", "conditions": { "windSpeed": 3 } }]
        }))
        .unwrap();
        assert_eq!(payload.category(), TaskCategory::Forecast);
        assert_eq!(payload.len(), 1);
    }

    #[test]
    fn category_names_are_stable() {
        assert_eq!(TaskCategory::Heatmap.to_string(), "heatmap-transform");
        assert_eq!(
            serde_json::to_value(TaskCategory::Forecast).unwrap(),
            json!("forecast-normalize")
        );
    }

    #[test]
    fn success_response_wire_shape() {
        let resp = WorkResponse::success(7, TransformResult::Heatmap(vec![]));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["success"], json!(true));
        assert!(value.get("error").is_none());
        assert!(resp.into_result().unwrap().is_empty());
    }

    #[test]
    fn failure_response_carries_error() {
        let resp = WorkResponse::failure(3, "boom");
        assert!(!resp.is_success());
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(resp.into_result().unwrap_err(), "boom");
    }

    #[test]
    fn inconsistent_response_frames_are_errors() {
        let resp: WorkResponse =
            serde_json::from_value(json!({ "id": 1, "success": true })).unwrap();
        assert!(resp.into_result().is_err());

        let resp: WorkResponse =
            serde_json::from_value(json!({ "id": 1, "success": false })).unwrap();
        assert!(resp.into_result().is_err());
    }

    #[test]
    fn request_id_is_shared_by_both_kinds() {
        let process = WorkRequest::Process {
            id: 9,
            payload: WorkPayload::Forecast(vec![]),
        };
        assert_eq!(process.id(), 9);
        assert_eq!(WorkRequest::Cancel { id: 4 }.id(), 4);
    }

    #[test]
    fn result_accessors_match_category() {
        let result = TransformResult::Forecast(vec![]);
        assert_eq!(result.category(), TaskCategory::Forecast);
        assert!(result.clone().into_heatmap().is_none());
        assert_eq!(result.into_forecast(), Some(vec![]));
    }
}
