// Multi-source orchestration tests
//
// Exercises the fallback orchestrator end to end with mock fetchers: source
// escalation, duplicate merging across sources, failure absorption, breaker
// and limiter behavior, and degraded serving from the result cache. No
// network involved.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wayfarer_poi::models::{Poi, Source};
use wayfarer_poi::services::circuit_breaker::BreakerConfig;
use wayfarer_poi::services::rate_limiter::RateLimitPolicy;
use wayfarer_poi::services::{CircuitBreaker, PoiAggregator, RateLimiter, TtlCache};
use wayfarer_poi::types::{
    FetchError, FetchOptions, FetchTarget, LocationResolver, ProviderError, ResolvedLocation,
    SourceFetcher, SourceQuery, SourceSelect,
};

const BASE_LAT: f64 = 48.8584;
const BASE_LON: f64 = 2.2945;

fn poi(id: &str, name: &str, lat: f64, lon: f64, source: Source) -> Poi {
    Poi {
        id: id.into(),
        name: name.into(),
        latitude: Some(lat),
        longitude: Some(lon),
        source,
        categories: vec![],
        extra: serde_json::Map::new(),
    }
}

/// Scripted fetcher: fixed results, optional permanent failure, call log
struct MockSource {
    source: Source,
    results: Vec<Poi>,
    fail: bool,
    calls: AtomicUsize,
    requested_limits: Mutex<Vec<usize>>,
}

impl MockSource {
    fn ok(source: Source, results: Vec<Poi>) -> Arc<Self> {
        Arc::new(Self {
            source,
            results,
            fail: false,
            calls: AtomicUsize::new(0),
            requested_limits: Mutex::new(Vec::new()),
        })
    }

    fn failing(source: Source) -> Arc<Self> {
        Arc::new(Self {
            source,
            results: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
            requested_limits: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for MockSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<Poi>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_limits.lock().unwrap().push(query.limit);
        if self.fail {
            return Err(ProviderError::Network("mock outage".into()));
        }
        Ok(self.results.iter().take(query.limit).cloned().collect())
    }
}

/// Succeeds on the first call, fails afterwards; for cache fallback tests
struct FlakySource {
    source: Source,
    results: Vec<Poi>,
    calls: AtomicUsize,
}

#[async_trait]
impl SourceFetcher for FlakySource {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(&self, _query: &SourceQuery) -> Result<Vec<Poi>, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(self.results.clone())
        } else {
            Err(ProviderError::Http(503))
        }
    }
}

struct MockResolver {
    location: Option<ResolvedLocation>,
}

#[async_trait]
impl LocationResolver for MockResolver {
    async fn resolve(&self, _place: &str) -> Result<Option<ResolvedLocation>, ProviderError> {
        Ok(self.location)
    }
}

/// Aggregator with a relaxed limiter and a small breaker threshold
fn aggregator(fetchers: Vec<Arc<dyn SourceFetcher>>) -> PoiAggregator {
    aggregator_with(
        fetchers,
        RateLimitPolicy::new(1_000.0, 1_000.0),
        BreakerConfig {
            failure_threshold: 2,
            recovery_timeout: std::time::Duration::from_secs(30),
            success_threshold: 1,
            max_half_open_requests: 1,
        },
    )
}

fn aggregator_with(
    fetchers: Vec<Arc<dyn SourceFetcher>>,
    rate_policy: RateLimitPolicy,
    breaker: BreakerConfig,
) -> PoiAggregator {
    let services: Vec<&str> = fetchers.iter().map(|f| f.source().service_name()).collect();
    PoiAggregator::new(
        fetchers,
        Arc::new(MockResolver {
            location: Some(ResolvedLocation {
                latitude: BASE_LAT,
                longitude: BASE_LON,
            }),
        }),
        Arc::new(RateLimiter::new(rate_policy)),
        Arc::new(CircuitBreaker::new(breaker, &services)),
        TtlCache::new(),
    )
}

fn here() -> FetchTarget {
    FetchTarget::Coordinates {
        latitude: BASE_LAT,
        longitude: BASE_LON,
    }
}

fn options(limit: usize) -> FetchOptions {
    FetchOptions {
        limit,
        ..FetchOptions::default()
    }
}

// ------------------------------------------------------------------------
// Escalation and merging
// ------------------------------------------------------------------------

#[tokio::test]
async fn escalates_and_merges_overlapping_sources() {
    // Database holds 3 POIs; OpenTripMap returns 5, two of which are the
    // same places under the same names within a few meters.
    let database = MockSource::ok(
        Source::Database,
        vec![
            poi("db-1", "Louvre", BASE_LAT, BASE_LON, Source::Database),
            poi("db-2", "Tuileries", BASE_LAT + 0.01, BASE_LON, Source::Database),
            poi("db-3", "Musee d'Orsay", BASE_LAT, BASE_LON + 0.01, Source::Database),
        ],
    );
    let opentripmap = MockSource::ok(
        Source::Opentripmap,
        vec![
            // ~30 m offset from db-1, same name: duplicate
            poi("otm-1", "Louvre", BASE_LAT + 0.00027, BASE_LON, Source::Opentripmap),
            // Same name as db-2, essentially the same point: duplicate
            poi("otm-2", "tuileries", BASE_LAT + 0.01, BASE_LON, Source::Opentripmap),
            poi("otm-3", "Pont Neuf", BASE_LAT - 0.01, BASE_LON, Source::Opentripmap),
            poi("otm-4", "Sainte-Chapelle", BASE_LAT - 0.02, BASE_LON, Source::Opentripmap),
            poi("otm-5", "Conciergerie", BASE_LAT - 0.03, BASE_LON, Source::Opentripmap),
        ],
    );

    let agg = aggregator(vec![database.clone(), opentripmap.clone()]);
    let results = agg.fetch(here(), options(10)).await.unwrap();

    // 3 + (5 - 2 duplicates) = 6 unique records, all returned
    assert_eq!(results.len(), 6);
    assert_eq!(database.calls(), 1);
    assert_eq!(opentripmap.calls(), 1);

    // Duplicates resolved in favor of the database records
    let louvre: Vec<_> = results.iter().filter(|p| p.name == "Louvre").collect();
    assert_eq!(louvre.len(), 1);
    assert_eq!(louvre[0].source, Source::Database);

    // The second source was over-requested: (10 - 3) * 2
    assert_eq!(*opentripmap.requested_limits.lock().unwrap(), vec![14]);
}

#[tokio::test]
async fn does_not_escalate_once_target_is_met() {
    let database = MockSource::ok(
        Source::Database,
        vec![
            poi("a", "One", 1.0, 1.0, Source::Database),
            poi("b", "Two", 2.0, 2.0, Source::Database),
            poi("c", "Three", 3.0, 3.0, Source::Database),
        ],
    );
    let opentripmap = MockSource::ok(Source::Opentripmap, vec![]);

    let agg = aggregator(vec![database.clone(), opentripmap.clone()]);
    let results = agg.fetch(here(), options(3)).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(opentripmap.calls(), 0, "target met, no escalation");
}

#[tokio::test]
async fn truncates_to_requested_limit() {
    let database = MockSource::ok(
        Source::Database,
        (0..10)
            .map(|i| poi(&format!("db-{i}"), &format!("Place {i}"), i as f64, i as f64, Source::Database))
            .collect(),
    );

    let agg = aggregator(vec![database]);
    let results = agg.fetch(here(), options(4)).await.unwrap();
    assert_eq!(results.len(), 4);
}

// ------------------------------------------------------------------------
// Failure absorption
// ------------------------------------------------------------------------

#[tokio::test]
async fn one_failing_source_never_aborts_the_fetch() {
    let database = MockSource::ok(
        Source::Database,
        vec![poi("a", "Only Hit", 1.0, 1.0, Source::Database)],
    );
    let opentripmap = MockSource::failing(Source::Opentripmap);

    let agg = aggregator(vec![database, opentripmap]);
    let results = agg.fetch(here(), options(10)).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "a");
}

#[tokio::test]
async fn all_sources_failing_is_an_empty_success() {
    let agg = aggregator(vec![
        MockSource::failing(Source::Database),
        MockSource::failing(Source::Opentripmap),
    ]);

    let results = agg.fetch(here(), options(10)).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn open_circuit_skips_the_operation_entirely() {
    // failure_threshold is 2: two failing fetches open the breaker
    let opentripmap = MockSource::failing(Source::Opentripmap);
    let agg = aggregator(vec![opentripmap.clone()]);

    for _ in 0..2 {
        assert!(agg.fetch(here(), options(5)).await.unwrap().is_empty());
    }
    assert_eq!(opentripmap.calls(), 2);

    // Breaker now Open: the fetcher must not be invoked again
    assert!(agg.fetch(here(), options(5)).await.unwrap().is_empty());
    assert_eq!(opentripmap.calls(), 2);
}

#[tokio::test]
async fn rate_limited_source_contributes_zero_results() {
    let database = MockSource::ok(
        Source::Database,
        vec![poi("a", "Cafe", 1.0, 1.0, Source::Database)],
    );
    // One token, no refill to speak of within the test
    let agg = aggregator_with(
        vec![database.clone()],
        RateLimitPolicy::new(1.0, 0.001),
        BreakerConfig::default(),
    );

    assert_eq!(agg.fetch(here(), options(5)).await.unwrap().len(), 1);
    // Second call is denied admission; fetcher untouched, fetch still Ok
    assert!(agg.fetch(here(), options(5)).await.unwrap().is_empty());
    assert_eq!(database.calls(), 1);
}

#[tokio::test]
async fn failing_source_degrades_to_cached_results() {
    let flaky = Arc::new(FlakySource {
        source: Source::Opentripmap,
        results: vec![poi("x", "Warm Cache", 1.0, 1.0, Source::Opentripmap)],
        calls: AtomicUsize::new(0),
    });
    let agg = aggregator(vec![flaky.clone()]);

    // First fetch succeeds and fills the result cache
    assert_eq!(agg.fetch(here(), options(5)).await.unwrap().len(), 1);

    // Provider now fails; the cached list is served instead of nothing
    let degraded = agg.fetch(here(), options(5)).await.unwrap();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].id, "x");
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
}

// ------------------------------------------------------------------------
// Source selection and input validation
// ------------------------------------------------------------------------

#[tokio::test]
async fn specific_source_bypasses_the_ladder() {
    let database = MockSource::ok(
        Source::Database,
        vec![poi("db", "Db Place", 1.0, 1.0, Source::Database)],
    );
    let opentripmap = MockSource::ok(
        Source::Opentripmap,
        vec![poi("otm", "Otm Place", 2.0, 2.0, Source::Opentripmap)],
    );

    let agg = aggregator(vec![database.clone(), opentripmap.clone()]);
    let mut opts = options(10);
    opts.source = SourceSelect::One(Source::Opentripmap);

    let results = agg.fetch(here(), opts).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "otm");
    assert_eq!(database.calls(), 0);
}

#[tokio::test]
async fn unconfigured_source_selection_is_invalid_input() {
    let agg = aggregator(vec![MockSource::ok(Source::Database, vec![])]);
    let mut opts = options(10);
    opts.source = SourceSelect::One(Source::Geoapify);

    assert!(matches!(
        agg.fetch(here(), opts).await,
        Err(FetchError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_source_call() {
    let database = MockSource::ok(Source::Database, vec![]);
    let agg = aggregator(vec![database.clone()]);

    let mut opts = options(10);
    opts.radius_meters = 10; // below the minimum
    assert!(matches!(
        agg.fetch(here(), opts).await,
        Err(FetchError::InvalidInput(_))
    ));

    let bad_coords = FetchTarget::Coordinates {
        latitude: 123.0,
        longitude: 0.0,
    };
    assert!(matches!(
        agg.fetch(bad_coords, options(10)).await,
        Err(FetchError::InvalidInput(_))
    ));

    assert!(matches!(
        agg.fetch(FetchTarget::Text("  ".into()), options(10)).await,
        Err(FetchError::InvalidInput(_))
    ));

    assert_eq!(database.calls(), 0);
}

// ------------------------------------------------------------------------
// Location resolution
// ------------------------------------------------------------------------

#[tokio::test]
async fn text_queries_go_through_the_resolver() {
    let database = MockSource::ok(
        Source::Database,
        vec![poi("a", "Near Resolved Point", 1.0, 1.0, Source::Database)],
    );
    let agg = aggregator(vec![database.clone()]);

    let results = agg
        .fetch(FetchTarget::Text("eiffel tower".into()), options(5))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(database.calls(), 1);
}

#[tokio::test]
async fn unresolvable_place_name_is_a_resolution_error() {
    let database = MockSource::ok(Source::Database, vec![]);
    let services = vec!["database"];
    let agg = PoiAggregator::new(
        vec![database.clone()],
        Arc::new(MockResolver { location: None }),
        Arc::new(RateLimiter::new(RateLimitPolicy::new(100.0, 100.0))),
        Arc::new(CircuitBreaker::new(BreakerConfig::default(), &services)),
        TtlCache::new(),
    );

    assert!(matches!(
        agg.fetch(FetchTarget::Text("nowhere land".into()), options(5))
            .await,
        Err(FetchError::Resolution(_))
    ));
    assert_eq!(database.calls(), 0);
}
