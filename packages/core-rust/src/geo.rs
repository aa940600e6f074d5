//! Geo features and the heatmap points derived from them.
//!
//! Input features follow the GeoJSON `Feature` shape: positions are `[lng, lat, ...]`
//! arrays and geometries are tagged by their `"type"` string. Only the geometry
//! kinds that yield a representative point are modeled; everything else collapses
//! into [`Geometry::Unsupported`] so one odd feature never rejects a whole batch.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A GeoJSON position: `[lng, lat]`, optionally followed by altitude.
pub type Position = Vec<f64>;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Feature geometry, internally tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        #[serde(default)]
        coordinates: Position,
    },
    Polygon {
        #[serde(default)]
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        #[serde(default)]
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    /// Any other geometry type (`LineString`, `GeometryCollection`, ...), or a
    /// geometry whose coordinates could not be read.
    #[serde(other)]
    Unsupported,
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl Geometry {
    /// Returns the point a heatmap should use for this geometry.
    ///
    /// - `Point`: its own coordinates.
    /// - `Polygon`: centroid of the first (outer) ring.
    /// - `MultiPolygon`: centroid of the first ring of the first polygon.
    ///
    /// Returns `None` for unsupported geometries, points with fewer than two
    /// coordinates, and rings with no usable positions.
    #[must_use]
    pub fn representative_point(&self) -> Option<LatLng> {
        match self {
            Self::Point { coordinates } => match coordinates.as_slice() {
                [lng, lat, ..] => Some(LatLng {
                    lat: *lat,
                    lng: *lng,
                }),
                _ => None,
            },
            Self::Polygon { coordinates } => coordinates.first().and_then(|ring| centroid(ring)),
            Self::MultiPolygon { coordinates } => coordinates
                .first()
                .and_then(|polygon| polygon.first())
                .and_then(|ring| centroid(ring)),
            Self::Unsupported => None,
        }
    }
}

/// Arithmetic mean of a ring's positions.
///
/// Positions with fewer than two numbers are skipped. The closing position of a
/// closed ring is counted like any other, matching a plain average over the list.
#[must_use]
pub fn centroid(ring: &[Position]) -> Option<LatLng> {
    let mut sum_lat = 0.0;
    let mut sum_lng = 0.0;
    let mut count = 0_u32;

    for position in ring {
        if let [lng, lat, ..] = position.as_slice() {
            sum_lat += lat;
            sum_lng += lng;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }

    let n = f64::from(count);
    Some(LatLng {
        lat: sum_lat / n,
        lng: sum_lng / n,
    })
}

/// Reads a geometry leniently: `null`/absent becomes `None`, and anything that
/// is present but malformed becomes `Some(Geometry::Unsupported)`.
fn deserialize_lenient_geometry<'de, D>(deserializer: D) -> Result<Option<Geometry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(value) => Some(serde_json::from_value(value).unwrap_or(Geometry::Unsupported)),
    })
}

// ---------------------------------------------------------------------------
// GeoFeature
// ---------------------------------------------------------------------------

/// A raw input feature as produced by upstream fetchers or mock generators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoFeature {
    #[serde(default, deserialize_with = "deserialize_lenient_geometry")]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GeoFeature {
    /// Builds a `Point` feature at the given position.
    #[must_use]
    pub fn point(lng: f64, lat: f64, properties: Map<String, Value>) -> Self {
        Self {
            geometry: Some(Geometry::Point {
                coordinates: vec![lng, lat],
            }),
            properties,
        }
    }
}

// ---------------------------------------------------------------------------
// HeatmapPoint
// ---------------------------------------------------------------------------

/// A normalized heatmap sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapPoint {
    pub lat: f64,
    pub lng: f64,
    /// Always within `[0, 1]`.
    pub intensity: f64,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
