//! Common types and constants used throughout the project.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("inventory table has no '{0}' column")]
    MissingColumn(String),

    #[error("{glottocode}: cannot parse {attribute} = '{value}' as a finite number")]
    InvalidNumber {
        glottocode: Glottocode,
        attribute: &'static str,
        value: String,
    },

    #[error("{0}: record has a latitude but no longitude")]
    MissingLongitude(Glottocode),

    #[error("invalid projection config: {0}")]
    InvalidConfig(String),
}

impl PrepError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// A Glottolog classification identifier (family, language or dialect),
/// e.g. `stan1293`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Glottocode(pub String);

impl Glottocode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Glottocode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Glottocode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Classification records
// ============================================================================

pub const ATTR_LATITUDE: &str = "latitude";
pub const ATTR_LONGITUDE: &str = "longitude";

/// One node of the classification tree.
///
/// `ancestors` is nearest-first: element 0 is the direct parent and the last
/// element is the root of the family tree. `attributes` holds the raw string
/// values from the dump (`latitude`, `longitude`, `iso639-3`, `level`, ...).
///
/// Serialized flat, as `{ "latitude": "..", ..., "ancestors": [..] }`; the
/// id is the key of the enclosing map and is not repeated in the body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoRecord {
    #[serde(skip)]
    pub id: Glottocode,
    pub ancestors: Vec<Glottocode>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl GeoRecord {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Identifier → record, as produced by the dump parser.
pub type GeoIndex = BTreeMap<Glottocode, GeoRecord>;

// ============================================================================
// Coordinates
// ============================================================================

/// A geographic position in degrees.
///
/// Ordering and equality are bit-exact so that positions can be collected
/// into sets; both components are finite by construction in the joiner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl PartialEq for LatLng {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LatLng {}

impl PartialOrd for LatLng {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LatLng {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lat
            .total_cmp(&other.lat)
            .then_with(|| self.lng.total_cmp(&other.lng))
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for (f64, f64) {
    fn from(p: LatLng) -> Self {
        (p.lat, p.lng)
    }
}

/// A cell on the output raster. `x` is the column (west → east from the
/// start longitude), `y` the row (north → south). Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

impl PixelPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for PixelPoint {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

impl From<PixelPoint> for (u32, u32) {
    fn from(p: PixelPoint) -> Self {
        (p.x, p.y)
    }
}

// ============================================================================
// Phonemes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhonemeRecord {
    pub symbol: String,
    /// Every classification node known to realize the phoneme.
    pub identifiers: BTreeSet<Glottocode>,
    /// Positions of the subset of `identifiers` that have geography.
    /// Empty until the record has been joined against a [`GeoIndex`].
    pub coordinates: BTreeSet<LatLng>,
}

impl PhonemeRecord {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }
}

/// Phoneme symbol → record.
pub type PhonemeIndex = BTreeMap<String, PhonemeRecord>;

/// Phoneme symbol → deduplicated raster cells. This is the final artifact.
pub type PhonemeCoords = BTreeMap<String, BTreeSet<PixelPoint>>;

// ============================================================================
// Projection
// ============================================================================

/// Parameters of the target raster. Latitudes and longitudes in degrees.
///
/// The defaults describe the shipped world map: 120 × 60 cells, wrapping at
/// the Bering Strait, cropped to ±67° of latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub map_width: u32,
    pub map_height: u32,
    /// Longitude drawn in column 0. There is no end longitude: the map wraps.
    pub start_longitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
}

pub const DEFAULT_MAP_WIDTH: u32 = 120;
pub const DEFAULT_MAP_HEIGHT: u32 = 60;
pub const DEFAULT_START_LONGITUDE: f64 = -168.1098805;
pub const DEFAULT_MIN_LATITUDE: f64 = -67.0;
pub const DEFAULT_MAX_LATITUDE: f64 = 67.0;

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            map_width: DEFAULT_MAP_WIDTH,
            map_height: DEFAULT_MAP_HEIGHT,
            start_longitude: DEFAULT_START_LONGITUDE,
            min_latitude: DEFAULT_MIN_LATITUDE,
            max_latitude: DEFAULT_MAX_LATITUDE,
        }
    }
}

impl ProjectionConfig {
    pub fn validate(&self) -> Result<(), PrepError> {
        if self.map_width == 0 || self.map_height == 0 {
            return Err(PrepError::InvalidConfig(format!(
                "map dimensions must be non-zero, got {}x{}",
                self.map_width, self.map_height
            )));
        }
        let finite = [self.start_longitude, self.min_latitude, self.max_latitude]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(PrepError::InvalidConfig(
                "longitude and latitude bounds must be finite".to_string(),
            ));
        }
        if self.min_latitude >= self.max_latitude {
            return Err(PrepError::InvalidConfig(format!(
                "min_latitude ({}) must be below max_latitude ({})",
                self.min_latitude, self.max_latitude
            )));
        }
        Ok(())
    }
}

/// Bounding box of every projected cell, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelExtents {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl PixelExtents {
    /// `None` when the iterator is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a PixelPoint>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let init = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(points.fold(init, |e, p| Self {
            min_x: e.min_x.min(p.x),
            max_x: e.max_x.max(p.x),
            min_y: e.min_y.min(p.y),
            max_y: e.max_y.max(p.y),
        }))
    }
}
