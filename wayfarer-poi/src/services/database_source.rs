//! Local database source
//!
//! The cheapest rung of the source ladder: seeded, manually curated, and
//! community-contributed rows in the local SQLite POI table. Row provenance
//! is preserved, so community rows keep their lower merge priority even
//! though they arrive through the same fetcher.

use crate::models::{Poi, Source};
use crate::services::poi_merger::haversine_meters;
use crate::types::{ProviderError, SourceFetcher, SourceQuery};
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::pois::{self, PoiRow};

pub struct DatabaseSource {
    db: SqlitePool,
}

impl DatabaseSource {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    fn normalize(row: PoiRow) -> Poi {
        let categories: Vec<String> = serde_json::from_str(&row.categories).unwrap_or_default();
        let extra = row
            .extra
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        Poi {
            // Row source tag, not the fetcher: community rows stay community
            source: row.source.parse().unwrap_or(Source::Unknown),
            id: row.id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            categories,
            extra,
        }
    }

    fn matches_categories(poi: &Poi, allow: &[String]) -> bool {
        if allow.is_empty() {
            return true;
        }
        poi.categories
            .iter()
            .any(|c| allow.iter().any(|a| a.eq_ignore_ascii_case(c)))
    }
}

#[async_trait]
impl SourceFetcher for DatabaseSource {
    fn source(&self) -> Source {
        Source::Database
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Poi>, ProviderError> {
        // Over-fetch the bounding box; the precise radius and category
        // filters below thin it back out.
        let rows = pois::find_in_area(
            &self.db,
            query.latitude,
            query.longitude,
            query.radius_meters,
            query.limit * 4,
        )
        .await
        .map_err(|e| ProviderError::Backend(e.to_string()))?;

        let center = (query.latitude, query.longitude);
        let mut results: Vec<Poi> = rows
            .into_iter()
            .map(Self::normalize)
            .filter(|poi| Self::matches_categories(poi, &query.categories))
            .filter(|poi| match poi.coordinates() {
                Some(point) => haversine_meters(center, point) <= query.radius_meters as f64,
                None => false,
            })
            .collect();
        results.truncate(query.limit);

        tracing::debug!(
            count = results.len(),
            lat = query.latitude,
            lon = query.longitude,
            radius_m = query.radius_meters,
            "Database source query complete"
        );
        Ok(results)
    }
}
