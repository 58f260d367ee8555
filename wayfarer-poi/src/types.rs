//! Core traits and types for the acquisition pipeline
//!
//! Defines the seams between the orchestrator and its collaborators: the
//! per-provider [`SourceFetcher`] trait, the [`LocationResolver`] upstream
//! dependency, the fetch options/validation, and the closed error taxonomy
//! the orchestrator matches exhaustively.

use crate::models::{Poi, Source};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Hard bounds on caller-supplied options
pub const MIN_RADIUS_METERS: u32 = 100;
pub const MAX_RADIUS_METERS: u32 = 50_000;
pub const MIN_LIMIT: usize = 1;
pub const MAX_LIMIT: usize = 100;

/// Defaults applied when an option is not given
pub const DEFAULT_RADIUS_METERS: u32 = 2_000;
pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_CALLER: &str = "anonymous";

/// What the caller wants POIs around
#[derive(Debug, Clone)]
pub enum FetchTarget {
    /// Free-text place name, resolved to coordinates before sourcing
    Text(String),
    /// Explicit WGS84 coordinates
    Coordinates { latitude: f64, longitude: f64 },
}

/// Which sources to consult
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelect {
    /// Escalating fallback through all sources in cost order
    Auto,
    /// Query exactly one provider, no fallback
    One(Source),
}

/// Caller-supplied fetch options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub source: SourceSelect,
    pub radius_meters: u32,
    /// Category allow-list, empty means no filtering
    pub categories: Vec<String>,
    pub limit: usize,
    /// Caller identity for rate-limit keying
    pub caller: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            source: SourceSelect::Auto,
            radius_meters: DEFAULT_RADIUS_METERS,
            categories: Vec::new(),
            limit: DEFAULT_LIMIT,
            caller: DEFAULT_CALLER.to_string(),
        }
    }
}

/// Validated per-source query, produced by the orchestrator
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: u32,
    pub categories: Vec<String>,
    /// How many results this source is asked for (escalation over-requests)
    pub limit: usize,
}

/// Typed errors from a single provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Http(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed payload: {0}")]
    Parse(String),
    /// Local backend failure (database source)
    #[error("backend error: {0}")]
    Backend(String),
}

/// Outcome of one wrapped source invocation
///
/// The orchestrator matches this exhaustively; everything except `Fetched`
/// is absorbed as zero results and logged.
#[derive(Debug)]
pub enum SourceOutcome {
    Fetched(Vec<Poi>),
    RateLimited { retry_after: Duration },
    CircuitOpen,
    Provider(ProviderError),
}

/// Errors surfaced to the fetch caller
///
/// Per-source failures never appear here; an all-sources-failed fetch is an
/// empty success.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The location resolution collaborator could not produce coordinates
    #[error("location resolution failed: {0}")]
    Resolution(String),
}

/// Coordinates produced by location resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolvedLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// One POI provider, already normalized
///
/// Implementations map their provider's wire format into [`Poi`] records and
/// their transport failures into [`ProviderError`]. They do not rate-limit or
/// breaker-wrap themselves; the orchestrator owns that.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Which source this fetcher produces records for
    fn source(&self) -> Source;

    /// Fetch POIs around the query point
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Poi>, ProviderError>;
}

/// Upstream free-text place resolution
///
/// `Ok(None)` means the collaborator answered but knows no such place;
/// `Err` means it could not answer at all.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve(&self, place: &str) -> Result<Option<ResolvedLocation>, ProviderError>;
}

/// Validate caller options against the hard bounds
pub fn validate_options(options: &FetchOptions) -> Result<(), FetchError> {
    if !(MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&options.radius_meters) {
        return Err(FetchError::InvalidInput(format!(
            "radius_meters must be {}..{}, got {}",
            MIN_RADIUS_METERS, MAX_RADIUS_METERS, options.radius_meters
        )));
    }
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&options.limit) {
        return Err(FetchError::InvalidInput(format!(
            "limit must be {}..{}, got {}",
            MIN_LIMIT, MAX_LIMIT, options.limit
        )));
    }
    if let SourceSelect::One(source) = options.source {
        if matches!(source, Source::Community | Source::Unknown) {
            return Err(FetchError::InvalidInput(format!(
                "'{}' is not a queryable source",
                source
            )));
        }
    }
    Ok(())
}

/// Validate the fetch target before any provider is contacted
pub fn validate_target(target: &FetchTarget) -> Result<(), FetchError> {
    match target {
        FetchTarget::Text(query) => {
            if query.trim().is_empty() {
                return Err(FetchError::InvalidInput("query must not be empty".into()));
            }
        }
        FetchTarget::Coordinates {
            latitude,
            longitude,
        } => {
            if !(-90.0..=90.0).contains(latitude) {
                return Err(FetchError::InvalidInput(format!(
                    "latitude must be -90..90, got {}",
                    latitude
                )));
            }
            if !(-180.0..=180.0).contains(longitude) {
                return Err(FetchError::InvalidInput(format!(
                    "longitude must be -180..180, got {}",
                    longitude
                )));
            }
        }
    }
    Ok(())
}
