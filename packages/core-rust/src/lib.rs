//! `Airmap` Core — geo features, forecast records, pure transforms, and the
//! message schemas used to offload those transforms to a background context.

pub mod codec;
pub mod forecast;
pub mod geo;
pub mod messages;
pub mod transform;

pub use forecast::{ForecastEntry, ForecastRecord};
pub use geo::{GeoFeature, Geometry, HeatmapPoint, LatLng};
pub use messages::{TaskCategory, TransformResult, WorkPayload, WorkRequest, WorkResponse};
