//! wayfarer-poi library interface
//!
//! Exposes the aggregation pipeline and HTTP surface for integration
//! testing and for the service binary.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use crate::config::ServiceSettings;
use crate::services::{
    CircuitBreaker, DatabaseSource, GeoapifyClient, OpenTripMapClient, PoiAggregator, RateLimiter,
    TtlCache,
};
use crate::types::{LocationResolver, ProviderError, ResolvedLocation, SourceFetcher};
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Local POI database pool
    pub db: SqlitePool,
    /// The aggregation pipeline, including its limiter/breaker/cache handles
    pub aggregator: Arc<PoiAggregator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, aggregator: Arc<PoiAggregator>) -> Self {
        Self {
            db,
            aggregator,
            startup_time: Utc::now(),
        }
    }
}

/// Stand-in resolver used when no geocoding provider is configured
///
/// Coordinate queries still work; free-text queries fail with a resolution
/// error that names the missing configuration.
struct UnconfiguredResolver;

#[async_trait]
impl LocationResolver for UnconfiguredResolver {
    async fn resolve(&self, _place: &str) -> Result<Option<ResolvedLocation>, ProviderError> {
        Err(ProviderError::Backend(
            "no geocoding provider configured (set a Geoapify API key)".into(),
        ))
    }
}

/// Assemble the aggregation pipeline from resolved settings
///
/// Sources without credentials are left off the ladder; the local database
/// source is always present.
pub fn build_aggregator(
    settings: &ServiceSettings,
    db: SqlitePool,
) -> anyhow::Result<Arc<PoiAggregator>> {
    let mut fetchers: Vec<Arc<dyn SourceFetcher>> = vec![Arc::new(DatabaseSource::new(db))];

    match &settings.opentripmap_api_key {
        Some(key) => {
            let mut client = OpenTripMapClient::new(key.clone())?;
            if let Some(base_url) = &settings.opentripmap_base_url {
                client = client.with_base_url(base_url);
            }
            fetchers.push(Arc::new(client));
        }
        None => tracing::warn!("OpenTripMap API key not configured, source disabled"),
    }

    let geoapify = match &settings.geoapify_api_key {
        Some(key) => {
            let mut client = GeoapifyClient::new(key.clone())?;
            if let Some(base_url) = &settings.geoapify_base_url {
                client = client.with_base_url(base_url);
            }
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("Geoapify API key not configured, source and geocoding disabled");
            None
        }
    };
    if let Some(client) = &geoapify {
        fetchers.push(client.clone());
    }

    let resolver: Arc<dyn LocationResolver> = match geoapify {
        Some(client) => client,
        None => Arc::new(UnconfiguredResolver),
    };

    let services: Vec<&str> = fetchers.iter().map(|f| f.source().service_name()).collect();
    let rate_limiter = Arc::new(RateLimiter::new(settings.rate_policy));
    let circuit_breaker = Arc::new(CircuitBreaker::new(settings.breaker, &services));
    let result_cache = TtlCache::new();

    Ok(Arc::new(
        PoiAggregator::new(
            fetchers,
            resolver,
            rate_limiter,
            circuit_breaker,
            result_cache,
        )
        .with_cache_ttl(settings.cache_ttl),
    ))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::pois::poi_routes())
        .merge(api::ops::ops_routes())
        .merge(api::health::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
