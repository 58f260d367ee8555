//! POI table queries

use sqlx::SqlitePool;
use wayfarer_common::Result;

/// Raw POI row as stored
#[derive(Debug, Clone)]
pub struct PoiRow {
    pub id: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub source: String,
    /// JSON array of category strings
    pub categories: String,
    /// JSON object of passthrough fields
    pub extra: Option<String>,
}

/// Meters per degree of latitude (and of longitude at the equator)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Fetch rows inside a bounding box around the query point
///
/// The box circumscribes the requested radius, so callers get a superset and
/// filter precisely if they care. Longitude bounds do not wrap at the
/// antimeridian; city-scale radii make that acceptable here.
pub async fn find_in_area(
    pool: &SqlitePool,
    latitude: f64,
    longitude: f64,
    radius_meters: u32,
    limit: usize,
) -> Result<Vec<PoiRow>> {
    let delta_lat = radius_meters as f64 / METERS_PER_DEGREE;
    let delta_lon =
        radius_meters as f64 / (METERS_PER_DEGREE * latitude.to_radians().cos().abs().max(0.01));

    let rows: Vec<(
        String,
        String,
        Option<f64>,
        Option<f64>,
        String,
        String,
        Option<String>,
    )> = sqlx::query_as(
        r#"
        SELECT id, name, latitude, longitude, source, categories, extra
        FROM pois
        WHERE latitude IS NOT NULL
          AND longitude IS NOT NULL
          AND latitude BETWEEN ? AND ?
          AND longitude BETWEEN ? AND ?
        ORDER BY rowid
        LIMIT ?
        "#,
    )
    .bind(latitude - delta_lat)
    .bind(latitude + delta_lat)
    .bind(longitude - delta_lon)
    .bind(longitude + delta_lon)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, name, latitude, longitude, source, categories, extra)| PoiRow {
                id,
                name,
                latitude,
                longitude,
                source,
                categories,
                extra,
            },
        )
        .collect())
}

/// Insert one POI row (seeding and tests)
pub async fn insert(pool: &SqlitePool, row: &PoiRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO pois (id, name, latitude, longitude, source, categories, extra)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&row.id)
    .bind(&row.name)
    .bind(row.latitude)
    .bind(row.longitude)
    .bind(&row.source)
    .bind(&row.categories)
    .bind(&row.extra)
    .execute(pool)
    .await?;

    Ok(())
}
