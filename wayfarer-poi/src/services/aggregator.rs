//! POI aggregation orchestrator
//!
//! Walks the source ladder cheapest-first, escalating to the next provider
//! only while the accumulated unique-result count is short of the target.
//! Every source call goes through the rate limiter and circuit breaker, and
//! any per-source failure degrades to zero results (or recently cached
//! ones) instead of failing the fetch. The only errors a caller ever sees
//! are input validation and place-name resolution; everything downstream is
//! absorbed and logged.

use crate::models::Poi;
use crate::services::circuit_breaker::{CallFailure, CircuitBreaker};
use crate::services::poi_merger::PoiMerger;
use crate::services::rate_limiter::{RateDecision, RateLimiter};
use crate::services::ttl_cache::{CacheLookup, TtlCache};
use crate::types::{
    validate_options, validate_target, FetchError, FetchOptions, FetchTarget, LocationResolver,
    SourceFetcher, SourceOutcome, SourceQuery, SourceSelect, MAX_LIMIT,
};
use std::sync::Arc;
use tokio::time::Duration;

/// How long a source's results stay eligible for degraded serving
pub const RESULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Escalation over-request factor, absorbs expected duplicate loss
const ESCALATION_OVERFETCH: usize = 2;

/// Fallback-orchestrating POI aggregator
pub struct PoiAggregator {
    /// Source ladder in escalation (cost) order
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    resolver: Arc<dyn LocationResolver>,
    rate_limiter: Arc<RateLimiter>,
    circuit_breaker: Arc<CircuitBreaker>,
    result_cache: TtlCache<Vec<Poi>>,
    cache_ttl: Duration,
    merger: PoiMerger,
}

impl PoiAggregator {
    pub fn new(
        fetchers: Vec<Arc<dyn SourceFetcher>>,
        resolver: Arc<dyn LocationResolver>,
        rate_limiter: Arc<RateLimiter>,
        circuit_breaker: Arc<CircuitBreaker>,
        result_cache: TtlCache<Vec<Poi>>,
    ) -> Self {
        Self {
            fetchers,
            resolver,
            rate_limiter,
            circuit_breaker,
            result_cache,
            cache_ttl: RESULT_CACHE_TTL,
            merger: PoiMerger::new(),
        }
    }

    /// Override how long cached source results stay eligible for degraded
    /// serving
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn result_cache(&self) -> &TtlCache<Vec<Poi>> {
        &self.result_cache
    }

    /// Fetch a deduplicated, priority-ordered POI list
    ///
    /// Always `Ok` once input validation and place resolution pass, even if
    /// every source fails; callers cannot distinguish "no POIs exist" from
    /// "all providers down" without the operational logs.
    pub async fn fetch(
        &self,
        target: FetchTarget,
        options: FetchOptions,
    ) -> Result<Vec<Poi>, FetchError> {
        validate_options(&options)?;
        validate_target(&target)?;

        let (latitude, longitude) = self.resolve_target(&target).await?;

        let selected: Vec<&Arc<dyn SourceFetcher>> = match options.source {
            SourceSelect::Auto => self.fetchers.iter().collect(),
            SourceSelect::One(source) => {
                let matching: Vec<_> = self
                    .fetchers
                    .iter()
                    .filter(|f| f.source() == source)
                    .collect();
                if matching.is_empty() {
                    return Err(FetchError::InvalidInput(format!(
                        "source '{}' is not configured",
                        source
                    )));
                }
                matching
            }
        };

        let target_limit = options.limit;
        let mut collected: Vec<Vec<Poi>> = Vec::new();
        let mut merged: Vec<Poi> = Vec::new();

        for (index, fetcher) in selected.into_iter().enumerate() {
            if index > 0 && merged.len() >= target_limit {
                break;
            }

            // Later sources are asked for twice the remaining deficit to
            // absorb the duplicates the merge will drop.
            let deficit = target_limit - merged.len();
            let request_limit = if index == 0 {
                target_limit
            } else {
                (deficit * ESCALATION_OVERFETCH).min(MAX_LIMIT)
            };

            let query = SourceQuery {
                latitude,
                longitude,
                radius_meters: options.radius_meters,
                categories: options.categories.clone(),
                limit: request_limit,
            };

            let source = fetcher.source();
            match self.fetch_one(fetcher.as_ref(), &query, &options.caller).await {
                SourceOutcome::Fetched(pois) => {
                    tracing::debug!(source = %source, count = pois.len(), "Source returned results");
                    collected.push(pois);
                    merged = self.merger.merge(&collected);
                }
                SourceOutcome::RateLimited { retry_after } => {
                    tracing::warn!(
                        source = %source,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Source skipped: rate limit exceeded"
                    );
                }
                SourceOutcome::CircuitOpen => {
                    tracing::warn!(source = %source, "Source skipped: circuit open");
                }
                SourceOutcome::Provider(error) => {
                    tracing::warn!(source = %source, error = %error, "Source failed");
                }
            }
        }

        merged.truncate(target_limit);
        tracing::debug!(
            count = merged.len(),
            target = target_limit,
            sources_answered = collected.len(),
            "Fetch complete"
        );
        Ok(merged)
    }

    async fn resolve_target(&self, target: &FetchTarget) -> Result<(f64, f64), FetchError> {
        match target {
            FetchTarget::Coordinates {
                latitude,
                longitude,
            } => Ok((*latitude, *longitude)),
            FetchTarget::Text(place) => match self.resolver.resolve(place).await {
                Ok(Some(location)) => Ok((location.latitude, location.longitude)),
                Ok(None) => Err(FetchError::Resolution(format!(
                    "no location found for '{}'",
                    place
                ))),
                Err(error) => Err(FetchError::Resolution(error.to_string())),
            },
        }
    }

    /// One source invocation: rate limiter, then circuit breaker, then the
    /// fetcher, caching success and serving the cache as degraded fallback
    async fn fetch_one(
        &self,
        fetcher: &dyn SourceFetcher,
        query: &SourceQuery,
        caller: &str,
    ) -> SourceOutcome {
        let service = fetcher.source().service_name();

        match self.rate_limiter.check(service, caller).await {
            RateDecision::Deny { retry_after } => {
                return SourceOutcome::RateLimited { retry_after }
            }
            RateDecision::Allow => {}
        }

        let cache_key = result_cache_key(service, query);
        let fallback_cache = self.result_cache.clone();
        let fallback_key = cache_key.clone();

        self.circuit_breaker
            .call(
                service,
                async {
                    let pois = fetcher.fetch(query).await?;
                    // Populated even when the top-level fetch was abandoned:
                    // the next caller gets a warm cache out of it.
                    self.result_cache
                        .put(&cache_key, pois.clone(), self.cache_ttl)
                        .await;
                    Ok(SourceOutcome::Fetched(pois))
                },
                |failure: CallFailure<_>| async move {
                    match fallback_cache.get(&fallback_key).await {
                        CacheLookup::Found(pois) => {
                            tracing::warn!(
                                service,
                                count = pois.len(),
                                "Serving cached results for unavailable source"
                            );
                            SourceOutcome::Fetched(pois)
                        }
                        CacheLookup::Miss => match failure {
                            CallFailure::Rejected => SourceOutcome::CircuitOpen,
                            CallFailure::Error(error) => SourceOutcome::Provider(error),
                        },
                    }
                },
            )
            .await
    }
}

/// Cache key over source and rounded query geometry
///
/// Four decimal places is ~11 m, close enough that nearby repeat queries
/// share an entry. The requested limit is deliberately excluded so degraded
/// serving works across differently sized requests.
fn result_cache_key(service: &str, query: &SourceQuery) -> String {
    format!(
        "{}|{:.4}|{:.4}|{}|{}",
        service,
        query.latitude,
        query.longitude,
        query.radius_meters,
        query.categories.join(",")
    )
}
