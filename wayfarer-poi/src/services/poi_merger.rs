//! Deduplication and merge engine
//!
//! Combines per-source result lists into one deduplicated, priority-ordered
//! list. Two records are the same place only when BOTH their names agree
//! (exact normalized match, or Jaro similarity above the threshold) and
//! their coordinates sit within the duplicate radius. One signal alone is
//! never enough: chain stores share names across town, and different
//! venues share buildings.

use crate::models::Poi;

/// Records closer than this are duplicate candidates
pub const DUPLICATE_DISTANCE_M: f64 = 100.0;
/// Jaro similarity above this counts as the same name
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.8;
/// Names shorter than this never fuzzy-match (exact match still applies)
pub const MIN_NAME_LEN: usize = 3;

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two (latitude, longitude) points, meters
pub fn haversine_meters(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Deduplication & merge engine
pub struct PoiMerger;

impl PoiMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge per-source lists, given in source priority order
    ///
    /// Left-to-right reduce: a candidate matching any already-kept record on
    /// both name and location is dropped, so the earliest (highest-priority)
    /// occurrence of a place survives. The final list is stably sorted by
    /// source priority, preserving input order within equal priority.
    pub fn merge(&self, lists: &[Vec<Poi>]) -> Vec<Poi> {
        let mut kept: Vec<Poi> = Vec::new();
        let mut dropped = 0usize;

        for candidate in lists.iter().flatten() {
            if kept.iter().any(|existing| is_duplicate(existing, candidate)) {
                dropped += 1;
                tracing::debug!(
                    name = %candidate.name,
                    source = %candidate.source,
                    "Dropping duplicate POI"
                );
            } else {
                kept.push(candidate.clone());
            }
        }

        if dropped > 0 {
            tracing::debug!(kept = kept.len(), dropped, "Merge complete");
        }

        kept.sort_by_key(|poi| poi.source.merge_priority());
        kept
    }
}

impl Default for PoiMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Is `candidate` the same place as `existing`?
fn is_duplicate(existing: &Poi, candidate: &Poi) -> bool {
    // The same provider record re-presented is always a duplicate, whether
    // or not it carries coordinates.
    if existing.source == candidate.source && existing.id == candidate.id {
        return true;
    }
    names_match(&existing.name, &candidate.name) && locations_match(existing, candidate)
}

/// Name agreement: exact normalized match, or fuzzy match for names long
/// enough that Jaro similarity is meaningful
fn names_match(a: &str, b: &str) -> bool {
    let a = normalize_name(a);
    let b = normalize_name(b);

    if a == b {
        return true;
    }
    a.chars().count() >= MIN_NAME_LEN
        && b.chars().count() >= MIN_NAME_LEN
        && strsim::jaro(&a, &b) > NAME_SIMILARITY_THRESHOLD
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Location agreement: both records must have usable coordinates within the
/// duplicate radius. Records without coordinates are arbitrarily far from
/// everything, so they can never collide.
fn locations_match(a: &Poi, b: &Poi) -> bool {
    match (a.coordinates(), b.coordinates()) {
        (Some(pa), Some(pb)) => haversine_meters(pa, pb) < DUPLICATE_DISTANCE_M,
        _ => false,
    }
}
