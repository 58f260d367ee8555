//! POI fetch endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Poi, Source};
use crate::types::{FetchError, FetchOptions, FetchTarget, SourceSelect};
use crate::AppState;

/// Query parameters for GET /pois
#[derive(Debug, Deserialize)]
pub struct PoiQueryParams {
    /// Free-text place name; mutually exclusive with lat/lon
    pub query: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius_meters: Option<u32>,
    /// Comma-separated category allow-list
    pub categories: Option<String>,
    pub limit: Option<usize>,
    /// "auto" (default) or a specific provider name
    pub source: Option<String>,
    /// Caller identity for rate-limit accounting
    pub caller: Option<String>,
}

/// POI list response
#[derive(Debug, Serialize)]
pub struct PoiListResponse {
    pub count: usize,
    pub pois: Vec<Poi>,
}

/// GET /pois
pub async fn list_pois(
    State(state): State<AppState>,
    Query(params): Query<PoiQueryParams>,
) -> ApiResult<Json<PoiListResponse>> {
    let target = match (params.query, params.lat, params.lon) {
        (Some(query), None, None) => FetchTarget::Text(query),
        (None, Some(latitude), Some(longitude)) => FetchTarget::Coordinates {
            latitude,
            longitude,
        },
        _ => {
            return Err(ApiError::BadRequest(
                "provide either 'query' or both 'lat' and 'lon'".into(),
            ))
        }
    };

    let mut options = FetchOptions::default();
    if let Some(radius) = params.radius_meters {
        options.radius_meters = radius;
    }
    if let Some(limit) = params.limit {
        options.limit = limit;
    }
    if let Some(categories) = params.categories {
        options.categories = categories
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(caller) = params.caller {
        options.caller = caller;
    }
    if let Some(source) = params.source {
        options.source = parse_source_select(&source)?;
    }

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("poi_fetch", %request_id);
    let pois = state
        .aggregator
        .fetch(target, options)
        .instrument(span)
        .await
        .map_err(|error| match error {
            FetchError::InvalidInput(message) => ApiError::BadRequest(message),
            FetchError::Resolution(message) => ApiError::Upstream(message),
        })?;

    Ok(Json(PoiListResponse {
        count: pois.len(),
        pois,
    }))
}

fn parse_source_select(raw: &str) -> ApiResult<SourceSelect> {
    if raw.eq_ignore_ascii_case("auto") {
        return Ok(SourceSelect::Auto);
    }
    let source: Source = raw.parse().unwrap_or(Source::Unknown);
    if source == Source::Unknown {
        return Err(ApiError::BadRequest(format!("unknown source '{}'", raw)));
    }
    Ok(SourceSelect::One(source))
}

/// Build POI routes
pub fn poi_routes() -> Router<AppState> {
    Router::new().route("/pois", get(list_pois))
}
