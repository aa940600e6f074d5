//! Forecast entries and their normalized records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Substituted when a condition field is absent or not numeric.
pub mod defaults {
    pub const WIND_SPEED: f64 = 5.0;
    pub const WIND_DIRECTION: f64 = 0.0;
    pub const PRECIPITATION: f64 = 0.0;
    pub const CLOUD_COVER: f64 = 0.0;
    pub const TEMPERATURE: f64 = 20.0;
    pub const HUMIDITY: f64 = 50.0;
    pub const PRESSURE: f64 = 1013.0;
    pub const CROSSWIND: f64 = 0.0;
}

/// Condition keys as they appear in raw entries.
pub mod fields {
    pub const WIND_SPEED: &str = "windSpeed";
    pub const WIND_DIRECTION: &str = "windDirection";
    pub const PRECIPITATION: &str = "precipitation";
    pub const CLOUD_COVER: &str = "cloudCover";
    pub const TEMPERATURE: &str = "temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const PRESSURE: &str = "pressure";
    pub const CROSSWIND: &str = "crosswind";
}

/// A raw forecast entry. Condition values may be numbers, numeric strings, or junk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastEntry {
    /// Copied through untouched; any JSON value is accepted.
    #[serde(default)]
    pub timestamp: Value,
    #[serde(default)]
    pub conditions: Map<String, Value>,
}

/// A forecast entry with every condition coerced to a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRecord {
    pub timestamp: Value,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub precipitation: f64,
    pub cloud_cover: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub crosswind: f64,
}
