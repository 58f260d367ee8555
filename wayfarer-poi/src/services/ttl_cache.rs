//! TTL cache for provider results
//!
//! Expiration is enforced twice over: `get` lazily drops an expired entry it
//! touches, and a background sweep clears everything expired on a fixed
//! interval so untouched keys cannot accumulate. Either mechanism alone
//! keeps reads correct; the sweep only bounds memory.
//!
//! Instead of one timer per key, expirations live in a single min-heap
//! indexed by deadline. Each `put` stamps the entry with a fresh generation;
//! a heap record whose generation no longer matches the live entry is a
//! leftover from an overwritten `put` and is skipped, which is what cancels
//! the earlier expiration schedule.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

/// Default sweep cadence
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    Found(V),
    Miss,
}

/// Hit/miss/key counters for operational monitoring
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Physical entries, including expired ones not yet swept
    pub keys: usize,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    generation: u64,
}

/// Heap record ordered by deadline; field order matters for derived Ord
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Expiry {
    expires_at: Instant,
    generation: u64,
    key: String,
}

#[derive(Debug)]
struct CacheInner<V> {
    entries: HashMap<String, Entry<V>>,
    expirations: BinaryHeap<Reverse<Expiry>>,
    next_generation: u64,
    hits: u64,
    misses: u64,
}

/// Shared TTL key/value cache
///
/// Cloning is cheap and clones share the same store.
#[derive(Debug, Clone)]
pub struct TtlCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                expirations: BinaryHeap::new(),
                next_generation: 0,
                hits: 0,
                misses: 0,
            })),
        }
    }

    /// Read a key; an expired-but-not-yet-swept entry reads as a miss and
    /// is dropped on the spot
    pub async fn get(&self, key: &str) -> CacheLookup<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;

        let expired = match inner.entries.get(key) {
            Some(entry) => now >= entry.expires_at,
            None => {
                inner.misses += 1;
                return CacheLookup::Miss;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            return CacheLookup::Miss;
        }

        inner.hits += 1;
        let value = inner.entries.get(key).map(|e| e.value.clone());
        match value {
            Some(value) => CacheLookup::Found(value),
            None => CacheLookup::Miss,
        }
    }

    /// Insert or replace a key
    ///
    /// Replacing atomically swaps both value and deadline; the superseded
    /// deadline can never evict the new value thanks to the generation tag.
    pub async fn put(&self, key: &str, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut inner = self.inner.lock().await;

        inner.next_generation += 1;
        let generation = inner.next_generation;
        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                generation,
            },
        );
        inner.expirations.push(Reverse(Expiry {
            expires_at,
            generation,
            key: key.to_string(),
        }));
    }

    pub async fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        inner.entries.remove(key);
    }

    /// Remove every expired entry in one pass, returning how many went
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let mut removed = 0;

        while let Some(Reverse(expiry)) = inner.expirations.peek() {
            if expiry.expires_at > now {
                break;
            }
            let Reverse(expiry) = inner.expirations.pop().unwrap();
            // Only evict if this heap record still describes the live entry
            let matches = inner
                .entries
                .get(&expiry.key)
                .is_some_and(|entry| entry.generation == expiry.generation);
            if matches {
                inner.entries.remove(&expiry.key);
                removed += 1;
            }
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            keys: inner.entries.len(),
        }
    }

    /// Start the periodic sweep task
    ///
    /// Runs until the returned handle is aborted or the runtime shuts down.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed, "Cache sweep evicted expired entries");
                }
            }
        })
    }
}

impl<V: Clone + Send + 'static> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
