//! Token-bucket rate limiting for outbound provider calls
//!
//! One bucket per (service, caller) pair, created lazily on first use.
//! `check` never blocks: it refills the bucket for the elapsed time, then
//! either takes a token or reports how long until one is available.

use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use wayfarer_common::config::Environment;

/// Bucket parameters for one service
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Maximum tokens a bucket can hold
    pub capacity: f64,
    /// Tokens added per second
    pub refill_per_second: f64,
}

impl RateLimitPolicy {
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            refill_per_second,
        }
    }

    /// Default policy for a deployment tier
    ///
    /// Development is relaxed so local work is never throttled; production
    /// is conservative to bound third-party API spend.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self::new(50.0, 25.0),
            Environment::Production => Self::new(5.0, 1.0),
        }
    }
}

/// Admission decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    Allow,
    /// Denied, with the estimated wait until one token is available
    Deny { retry_after: Duration },
}

/// Read-only view of one bucket, for operational monitoring
#[derive(Debug, Clone, Serialize)]
pub struct BucketSnapshot {
    pub service: String,
    pub caller: String,
    /// Tokens as of the last admission check (snapshots do not refill)
    pub tokens: f64,
    pub capacity: f64,
    pub refill_per_second: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(policy: RateLimitPolicy) -> Self {
        Self {
            tokens: policy.capacity,
            capacity: policy.capacity,
            refill_per_second: policy.refill_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Refill tokens owed since the last refill, capped at capacity
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> RateDecision {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateDecision::Allow
        } else {
            let deficit = 1.0 - self.tokens;
            RateDecision::Deny {
                retry_after: Duration::from_secs_f64(deficit / self.refill_per_second),
            }
        }
    }
}

/// Keyed token-bucket rate limiter
///
/// The whole table sits behind one async mutex; checks are a handful of
/// float operations, so contention on the lock is cheaper than per-bucket
/// locking at this key-space size. The lock is never held across an await
/// of anything slower than the map access itself.
pub struct RateLimiter {
    buckets: Mutex<HashMap<(String, String), Bucket>>,
    default_policy: RateLimitPolicy,
    per_service: HashMap<String, RateLimitPolicy>,
}

impl RateLimiter {
    pub fn new(default_policy: RateLimitPolicy) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            default_policy,
            per_service: HashMap::new(),
        }
    }

    /// Override the policy for a named service
    pub fn with_service_policy(mut self, service: &str, policy: RateLimitPolicy) -> Self {
        self.per_service.insert(service.to_string(), policy);
        self
    }

    fn policy_for(&self, service: &str) -> RateLimitPolicy {
        self.per_service
            .get(service)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Admission check for one outbound call
    ///
    /// Atomic per call: concurrent callers against the same key cannot both
    /// consume the same token because the table lock spans refill and take.
    pub async fn check(&self, service: &str, caller: &str) -> RateDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry((service.to_string(), caller.to_string()))
            .or_insert_with(|| Bucket::new(self.policy_for(service)));
        let decision = bucket.try_take(now);

        if let RateDecision::Deny { retry_after } = decision {
            tracing::debug!(
                service,
                caller,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit denied"
            );
        }
        decision
    }

    /// Side-effect-free view of all buckets
    pub async fn snapshot(&self) -> Vec<BucketSnapshot> {
        let buckets = self.buckets.lock().await;
        let mut snapshots: Vec<BucketSnapshot> = buckets
            .iter()
            .map(|((service, caller), bucket)| BucketSnapshot {
                service: service.clone(),
                caller: caller.clone(),
                tokens: bucket.tokens,
                capacity: bucket.capacity,
                refill_per_second: bucket.refill_per_second,
            })
            .collect();
        snapshots.sort_by(|a, b| (&a.service, &a.caller).cmp(&(&b.service, &b.caller)));
        snapshots
    }
}
