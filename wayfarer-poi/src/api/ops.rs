//! Operational introspection endpoints
//!
//! Read-only, side-effect-free views of the rate limiter buckets, circuit
//! breaker states, and result cache counters. None of these mutate what
//! they report: snapshots do not refill tokens or transition breakers.

use axum::{extract::State, routing::get, Json, Router};

use crate::services::circuit_breaker::BreakerSnapshot;
use crate::services::rate_limiter::BucketSnapshot;
use crate::services::ttl_cache::CacheStats;
use crate::AppState;

/// GET /ops/limiter
pub async fn limiter_snapshot(State(state): State<AppState>) -> Json<Vec<BucketSnapshot>> {
    Json(state.aggregator.rate_limiter().snapshot().await)
}

/// GET /ops/breakers
pub async fn breaker_snapshot(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.aggregator.circuit_breaker().snapshot().await)
}

/// GET /ops/cache
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.aggregator.result_cache().stats().await)
}

/// Build operational monitoring routes
pub fn ops_routes() -> Router<AppState> {
    Router::new()
        .route("/ops/limiter", get(limiter_snapshot))
        .route("/ops/breakers", get(breaker_snapshot))
        .route("/ops/cache", get(cache_stats))
}
