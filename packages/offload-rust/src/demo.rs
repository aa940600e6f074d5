//! Inputs for the `offload-demo` binary: payloads read from JSON files, or
//! generated synthetically with a seeded RNG.

use std::path::Path;

use airmap_core::messages::WorkPayload;
use airmap_core::{ForecastEntry, GeoFeature};
use anyhow::Context as _;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};

/// Which transform a demo run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputKind {
    /// Geo features to heatmap points.
    Heatmap,
    /// Forecast entries to normalized records.
    Forecast,
}

/// Read a JSON array of features or forecast entries from `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON array of the
/// expected record shape.
pub fn load_payload(path: &Path, kind: InputKind) -> anyhow::Result<WorkPayload> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let payload = match kind {
        InputKind::Heatmap => WorkPayload::Heatmap(
            serde_json::from_str(&text)
                .with_context(|| format!("{} is not a JSON array of features", path.display()))?,
        ),
        InputKind::Forecast => WorkPayload::Forecast(
            serde_json::from_str(&text).with_context(|| {
                format!("{} is not a JSON array of forecast entries", path.display())
            })?,
        ),
    };
    Ok(payload)
}

/// A reproducible payload of `count` synthetic records.
#[must_use]
pub fn synthetic_payload(kind: InputKind, count: usize, seed: u64) -> WorkPayload {
    let mut rng = StdRng::seed_from_u64(seed);
    match kind {
        InputKind::Heatmap => WorkPayload::Heatmap(synthetic_features(&mut rng, count)),
        InputKind::Forecast => WorkPayload::Forecast(synthetic_forecast(&mut rng, count)),
    }
}

/// Monitoring stations scattered over eastern China. Roughly one in ten
/// features carries a geometry the heatmap transform drops.
pub fn synthetic_features(rng: &mut impl Rng, count: usize) -> Vec<GeoFeature> {
    (0..count)
        .map(|i| {
            let lng = rng.random_range(105.0..122.0);
            let lat = rng.random_range(22.0..41.0);

            let geometry = match rng.random_range(0..10) {
                0 => json!({ "type": "LineString", "coordinates": [[lng, lat], [lng + 0.1, lat]] }),
                1..=3 => {
                    let d = rng.random_range(0.05..0.5);
                    json!({
                        "type": "Polygon",
                        "coordinates": [[[lng, lat], [lng + d, lat], [lng + d, lat + d], [lng, lat + d]]]
                    })
                }
                _ => json!({ "type": "Point", "coordinates": [lng, lat] }),
            };

            let mut properties = Map::new();
            let value: f64 = rng.random_range(0.0..1.2);
            match rng.random_range(0..4) {
                0 => {}
                1 => {
                    properties.insert("数值".to_string(), json!(value));
                }
                2 => {
                    properties.insert("value".to_string(), Value::String(format!("{value:.3}")));
                }
                _ => {
                    properties.insert("value".to_string(), json!(value));
                }
            }
            if rng.random_bool(0.5) {
                properties.insert("name_en".to_string(), Value::String(format!("Station {}", i + 1)));
            }

            GeoFeature {
                geometry: serde_json::from_value(geometry).ok(),
                properties,
            }
        })
        .collect()
}

/// Hourly forecast entries starting at 2024-01-01T00:00:00Z. Some fields are
/// missing or carry unparseable text, so the defaults get exercised.
pub fn synthetic_forecast(rng: &mut impl Rng, count: usize) -> Vec<ForecastEntry> {
    const START_MS: i64 = 1_704_067_200_000;
    const HOUR_MS: i64 = 3_600_000;

    (0..count)
        .map(|i| {
            let offset = i64::try_from(i).unwrap_or(i64::MAX).saturating_mul(HOUR_MS);
            let mut conditions = Map::new();
            let mut put = |key: &str, value: f64| {
                conditions.insert(key.to_string(), json!(value));
            };
            put("windSpeed", rng.random_range(0.0..25.0));
            put("windDirection", rng.random_range(0.0..360.0));
            put("precipitation", rng.random_range(0.0..12.0));
            put("cloudCover", rng.random_range(0.0..100.0));
            put("temperature", rng.random_range(-10.0..38.0));
            put("humidity", rng.random_range(10.0..100.0));
            put("pressure", rng.random_range(985.0..1035.0));

            if rng.random_bool(0.2) {
                conditions.insert("windSpeed".to_string(), Value::String("calm".to_string()));
            }
            if rng.random_bool(0.3) {
                conditions.remove("pressure");
            }

            ForecastEntry {
                timestamp: json!(START_MS.saturating_add(offset)),
                conditions,
            }
        })
        .collect()
}
