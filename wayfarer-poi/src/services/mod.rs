//! Service layer for wayfarer-poi
//!
//! Resilience primitives (rate limiter, circuit breaker, TTL cache), one
//! fetcher per POI source, and the orchestration and merge engines that
//! combine them.

pub mod aggregator;
pub mod circuit_breaker;
pub mod database_source;
pub mod geoapify_client;
pub mod opentripmap_client;
pub mod poi_merger;
pub mod rate_limiter;
pub mod ttl_cache;

pub use aggregator::PoiAggregator;
pub use circuit_breaker::{BreakerConfig, BreakerStatus, CircuitBreaker};
pub use database_source::DatabaseSource;
pub use geoapify_client::GeoapifyClient;
pub use opentripmap_client::OpenTripMapClient;
pub use poi_merger::PoiMerger;
pub use rate_limiter::{RateDecision, RateLimitPolicy, RateLimiter};
pub use ttl_cache::{CacheLookup, TtlCache};
