//! Normalized POI record and source provenance
//!
//! Every fetcher, whatever shape its provider returns, normalizes into
//! [`Poi`]. The merge engine and the HTTP surface only ever see this type.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where a POI record came from
///
/// Provenance drives merge ordering: when two records are judged duplicates,
/// the one from the higher-priority source survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Local POI table (seeded or manually curated rows)
    Database,
    /// OpenTripMap, the primary external provider
    Opentripmap,
    /// Geoapify Places, the secondary external provider
    Geoapify,
    /// Community-contributed rows in the local table
    Community,
    /// Anything else (forward compatibility with new provider tags)
    #[serde(other)]
    Unknown,
}

impl Source {
    /// Merge priority, lower sorts first
    ///
    /// Curated data and the primary provider outrank the secondary provider,
    /// community submissions follow, unrecognized tags sort last.
    pub fn merge_priority(&self) -> u8 {
        match self {
            Source::Database | Source::Opentripmap => 0,
            Source::Geoapify => 1,
            Source::Community => 2,
            Source::Unknown => 3,
        }
    }

    /// Service identifier used for rate limiter and circuit breaker keying
    pub fn service_name(&self) -> &'static str {
        match self {
            Source::Database | Source::Community => "database",
            Source::Opentripmap => "opentripmap",
            Source::Geoapify => "geoapify",
            Source::Unknown => "unknown",
        }
    }
}

impl FromStr for Source {
    type Err = ();

    /// Never fails: unrecognized tags map to [`Source::Unknown`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "database" => Source::Database,
            "opentripmap" => Source::Opentripmap,
            "geoapify" => Source::Geoapify,
            "community" => Source::Community,
            _ => Source::Unknown,
        })
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Source::Database => "database",
            Source::Opentripmap => "opentripmap",
            Source::Geoapify => "geoapify",
            Source::Community => "community",
            Source::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Normalized point-of-interest record
///
/// `id` is provider-scoped and opaque; two providers may use the same id for
/// different places. Coordinates may be absent, and a (0.0, 0.0) pair from a
/// provider is treated as absent too since it is the common "we don't know"
/// sentinel in upstream data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    /// Provider-scoped opaque identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// WGS84 latitude, -90..90
    #[serde(default)]
    pub latitude: Option<f64>,
    /// WGS84 longitude, -180..180
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Originating source
    pub source: Source,
    /// Ordered category tags, provider vocabulary preserved
    #[serde(default)]
    pub categories: Vec<String>,
    /// Provider-specific passthrough fields, preserved but never inspected
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Poi {
    /// Usable coordinates, or `None` for absent/sentinel/out-of-range values
    ///
    /// Records without usable coordinates are defined to be arbitrarily far
    /// from everything, so they can never collide during merge.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = (self.latitude?, self.longitude?);
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some((lat, lon))
    }
}
