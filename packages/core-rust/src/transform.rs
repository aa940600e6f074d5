//! Pure transforms from raw records to normalized records.
//!
//! [`run`] is the only entry point the offload layer calls, both inside a
//! background context and on the synchronous fallback path. Both paths produce
//! the same records because they run the same function.

use serde_json::{Map, Value};

use crate::forecast::{defaults, fields, ForecastEntry, ForecastRecord};
use crate::geo::{GeoFeature, HeatmapPoint};
use crate::messages::{TransformResult, WorkPayload};

/// Intensity used when a feature carries no readable value.
pub const DEFAULT_INTENSITY: f64 = 0.5;

/// Property holding a feature's measured value.
pub const VALUE_KEY: &str = "value";

/// Localized spelling of [`VALUE_KEY`] found in some upstream datasets.
pub const LOCALIZED_VALUE_KEY: &str = "数值";

/// Name properties, in lookup order.
pub const NAME_KEYS: [&str; 2] = ["name_en", "NAME_EN"];

/// Runs the transform selected by the payload's category.
#[must_use]
pub fn run(payload: &WorkPayload) -> TransformResult {
    match payload {
        WorkPayload::Heatmap(features) => TransformResult::Heatmap(heatmap(features)),
        WorkPayload::Forecast(entries) => TransformResult::Forecast(forecast(entries)),
    }
}

/// Coerces a JSON value to a finite number.
///
/// Numbers pass through; strings are trimmed and parsed as decimals. Anything
/// else, and any result that is NaN or infinite, yields `None`.
#[must_use]
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

/// Converts features into heatmap points.
///
/// Features without a usable geometry are dropped; the rest keep their input order.
#[must_use]
pub fn heatmap(features: &[GeoFeature]) -> Vec<HeatmapPoint> {
    features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let Some(point) = feature
                .geometry
                .as_ref()
                .and_then(crate::geo::Geometry::representative_point)
            else {
                tracing::trace!(index, "dropping feature without a usable geometry");
                return None;
            };
            Some(HeatmapPoint {
                lat: point.lat,
                lng: point.lng,
                intensity: intensity(&feature.properties),
                name: name(&feature.properties, index),
            })
        })
        .collect()
}

/// `value` if it parses as a number, else the localized key, else the default.
/// An unparseable `value` falls through to the localized key like a missing one.
fn intensity(properties: &Map<String, Value>) -> f64 {
    properties
        .get(VALUE_KEY)
        .and_then(coerce_number)
        .or_else(|| properties.get(LOCALIZED_VALUE_KEY).and_then(coerce_number))
        .unwrap_or(DEFAULT_INTENSITY)
        .clamp(0.0, 1.0)
}

fn name(properties: &Map<String, Value>, index: usize) -> String {
    NAME_KEYS
        .iter()
        .find_map(|key| match properties.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| format!("location {}", index + 1))
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

/// Normalizes forecast entries one-to-one, preserving order.
#[must_use]
pub fn forecast(entries: &[ForecastEntry]) -> Vec<ForecastRecord> {
    entries.iter().map(normalize_entry).collect()
}

fn normalize_entry(entry: &ForecastEntry) -> ForecastRecord {
    let field = |key: &str, default: f64| {
        entry
            .conditions
            .get(key)
            .and_then(coerce_number)
            .unwrap_or(default)
    };

    ForecastRecord {
        timestamp: entry.timestamp.clone(),
        wind_speed: field(fields::WIND_SPEED, defaults::WIND_SPEED),
        wind_direction: field(fields::WIND_DIRECTION, defaults::WIND_DIRECTION),
        precipitation: field(fields::PRECIPITATION, defaults::PRECIPITATION),
        cloud_cover: field(fields::CLOUD_COVER, defaults::CLOUD_COVER),
        temperature: field(fields::TEMPERATURE, defaults::TEMPERATURE),
        humidity: field(fields::HUMIDITY, defaults::HUMIDITY),
        pressure: field(fields::PRESSURE, defaults::PRESSURE),
        crosswind: field(fields::CROSSWIND, defaults::CROSSWIND),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::geo::Geometry;

    fn feature(value: Value) -> GeoFeature {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn coerce_number_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_number(&json!(3)), Some(3.0));
        assert_eq!(coerce_number(&json!(-1.5)), Some(-1.5));
        assert_eq!(coerce_number(&json!(" 42.5 ")), Some(42.5));
        assert_eq!(coerce_number(&json!("not-a-number")), None);
        assert_eq!(coerce_number(&json!("")), None);
        assert_eq!(coerce_number(&json!("inf")), None);
        assert_eq!(coerce_number(&json!(true)), None);
        assert_eq!(coerce_number(&Value::Null), None);
    }

    #[test]
    fn polygon_feature_becomes_centroid_point() {
        let features = vec![feature(json!({
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0, 0], [0, 2], [2, 2], [2, 0]]]
            },
            "properties": { "value": 0.8, "name_en": "Square" }
        }))];

        let points = heatmap(&features);
        assert_eq!(
            points,
            vec![HeatmapPoint {
                lat: 1.0,
                lng: 1.0,
                intensity: 0.8,
                name: "Square".to_string(),
            }]
        );
    }

    #[test]
    fn unsupported_and_missing_geometries_are_dropped() {
        let features = vec![
            feature(json!({ "geometry": { "type": "Point", "coordinates": [10, 20] } })),
            feature(json!({ "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] } })),
            feature(json!({ "properties": { "value": 1 } })),
            feature(json!({ "geometry": { "type": "Polygon", "coordinates": [[]] } })),
            feature(json!({ "geometry": { "type": "Point", "coordinates": [30, 40] } })),
        ];

        let points = heatmap(&features);
        assert_eq!(points.len(), features.len() - 3);
        assert_eq!((points[0].lat, points[0].lng), (20.0, 10.0));
        assert_eq!((points[1].lat, points[1].lng), (40.0, 30.0));
    }

    #[test]
    fn intensity_is_clamped_and_defaulted() {
        let features = vec![
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "value": "5" }
            })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": {}
            })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "value": -3 }
            })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "value": "junk" }
            })),
        ];

        let intensities: Vec<f64> = heatmap(&features).iter().map(|p| p.intensity).collect();
        assert_eq!(intensities, vec![1.0, 0.5, 0.0, 0.5]);
    }

    #[test]
    fn localized_value_key_is_a_fallback() {
        let features = vec![
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "数值": "0.25" }
            })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "value": 0.75, "数值": 0.1 }
            })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "value": "n/a", "数值": 0.4 }
            })),
        ];

        let intensities: Vec<f64> = heatmap(&features).iter().map(|p| p.intensity).collect();
        assert_eq!(intensities, vec![0.25, 0.75, 0.4]);
    }

    #[test]
    fn names_fall_back_to_input_position() {
        let features = vec![
            feature(json!({ "geometry": null })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "NAME_EN": "Upper" }
            })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "name_en": "lower", "NAME_EN": "Upper" }
            })),
            feature(json!({
                "geometry": { "type": "Point", "coordinates": [0, 0] },
                "properties": { "name_en": 12 }
            })),
        ];

        let names: Vec<String> = heatmap(&features).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Upper", "lower", "location 4"]);
    }

    #[test]
    fn forecast_substitutes_defaults_and_keeps_timestamp() {
        let entries: Vec<ForecastEntry> = serde_json::from_value(json!([
            {
                "timestamp": "2024-05-01T06:00:00+08:00",
                "conditions": { "windSpeed": "not-a-number", "temperature": "18.5", "humidity": 70 }
            },
            { "timestamp": 1_714_500_000 }
        ]))
        .unwrap();

        let records = forecast(&entries);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].timestamp, json!("2024-05-01T06:00:00+08:00"));
        assert_eq!(records[0].wind_speed, 5.0);
        assert_eq!(records[0].temperature, 18.5);
        assert_eq!(records[0].humidity, 70.0);
        assert_eq!(records[0].pressure, defaults::PRESSURE);

        assert_eq!(records[1].timestamp, json!(1_714_500_000));
        assert_eq!(records[1].wind_direction, defaults::WIND_DIRECTION);
        assert_eq!(records[1].cloud_cover, defaults::CLOUD_COVER);
        assert_eq!(records[1].crosswind, defaults::CROSSWIND);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(run(&WorkPayload::Heatmap(vec![])), TransformResult::Heatmap(vec![]));
        assert_eq!(run(&WorkPayload::Forecast(vec![])), TransformResult::Forecast(vec![]));
    }

    fn arb_property_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            (-10.0..10.0_f64).prop_map(|v| json!(v)),
            "[0-9a-z. ]{0,6}".prop_map(Value::String),
        ]
    }

    fn arb_feature() -> impl Strategy<Value = GeoFeature> {
        let geometry = prop_oneof![
            Just(None),
            Just(Some(Geometry::Unsupported)),
            (-180.0..180.0_f64, -90.0..90.0_f64)
                .prop_map(|(lng, lat)| Some(Geometry::Point { coordinates: vec![lng, lat] })),
            prop::collection::vec(
                (-180.0..180.0_f64, -90.0..90.0_f64).prop_map(|(lng, lat)| vec![lng, lat]),
                0..6
            )
            .prop_map(|ring| Some(Geometry::Polygon { coordinates: vec![ring] })),
        ];
        (geometry, arb_property_value()).prop_map(|(geometry, value)| {
            let mut properties = Map::new();
            properties.insert(VALUE_KEY.to_string(), value);
            GeoFeature { geometry, properties }
        })
    }

    proptest! {
        /// Output never grows, keeps intensities in range, and drops exactly the unusable features.
        #[test]
        fn heatmap_drops_only_unusable_features(features in prop::collection::vec(arb_feature(), 0..32)) {
            let usable = features
                .iter()
                .filter(|f| f.geometry.as_ref().and_then(Geometry::representative_point).is_some())
                .count();
            let points = heatmap(&features);
            prop_assert_eq!(points.len(), usable);
            for p in &points {
                prop_assert!((0.0..=1.0).contains(&p.intensity));
            }
        }

        /// Forecast normalization is one-to-one and order preserving.
        #[test]
        fn forecast_is_one_to_one(stamps in prop::collection::vec("[0-9T:-]{1,20}", 0..32)) {
            let entries: Vec<ForecastEntry> = stamps
                .iter()
                .map(|s| ForecastEntry { timestamp: json!(s), conditions: Map::new() })
                .collect();
            let records = forecast(&entries);
            prop_assert_eq!(records.len(), entries.len());
            for (record, stamp) in records.iter().zip(&stamps) {
                prop_assert_eq!(&record.timestamp, &json!(stamp));
                prop_assert_eq!(record.wind_speed, defaults::WIND_SPEED);
            }
        }
    }
}
