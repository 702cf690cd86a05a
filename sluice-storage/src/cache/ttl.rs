//! Bounded TTL map with per-key single-flight population.
//!
//! Reads and writes are atomic per key (`dashmap` shards). Population on a
//! miss goes through a per-key async gate so concurrent misses for the same
//! key run the loader once; the other callers wait and then read the value
//! the first caller inserted. A failed load inserts nothing, and neither
//! does a load that was invalidated while it ran.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests can drive it
//! with a paused clock.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::stats::{CacheCounters, CacheStats};

/// Configuration for a [`TtlCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlCacheConfig {
    /// Lifetime of an entry, measured from insertion.
    pub ttl: Duration,
    /// Maximum number of live entries; the oldest entry is evicted first.
    pub max_entries: usize,
}

impl TtlCacheConfig {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
        }
    }
}

/// Outcome of [`TtlCache::get_or_try_insert_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<V> {
    /// Served from cache; the loader did not run for this caller.
    Hit(V),
    /// Produced by this caller's loader and inserted.
    Loaded(V),
}

impl<V> CacheLookup<V> {
    pub fn was_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_value(self) -> V {
        match self {
            CacheLookup::Hit(value) | CacheLookup::Loaded(value) => value,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Per-key population gate. `generation` moves on every invalidation of the
/// key, so a loader can tell whether its result is already stale.
#[derive(Default)]
struct Flight {
    gate: Mutex<()>,
    generation: AtomicU64,
}

/// Shared TTL cache.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    inflight: DashMap<K, Arc<Flight>>,
    config: TtlCacheConfig,
    counters: CacheCounters,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: TtlCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            config,
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> &TtlCacheConfig {
        &self.config
    }

    fn is_live(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.config.ttl
    }

    /// Look up a live entry. Expired entries are removed on the way.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.lookup(key);
        if found.is_some() {
            CacheCounters::bump(&self.counters.hits);
        } else {
            CacheCounters::bump(&self.counters.misses);
        }
        found
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let cached = self
            .entries
            .get(key)
            .map(|entry| self.is_live(&entry, now).then(|| entry.value.clone()));

        match cached {
            Some(Some(value)) => Some(value),
            Some(None) => {
                if self
                    .entries
                    .remove_if(key, |_, entry| !self.is_live(entry, now))
                    .is_some()
                {
                    CacheCounters::bump(&self.counters.expirations);
                }
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry, restarting its TTL.
    pub fn insert(&self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_entries {
            self.make_room();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn make_room(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| self.is_live(entry, now));
        let expired = before.saturating_sub(self.entries.len());
        for _ in 0..expired {
            CacheCounters::bump(&self.counters.expirations);
        }

        while self.entries.len() >= self.config.max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            match victim {
                Some(victim) => {
                    self.entries.remove(&victim);
                    CacheCounters::bump(&self.counters.evictions);
                }
                None => break,
            }
        }
    }

    /// Drop an entry. Returns whether a live or expired entry was present.
    ///
    /// A load for `key` that is in flight will not insert its result.
    pub fn invalidate(&self, key: &K) -> bool {
        if let Some(flight) = self.inflight.get(key) {
            flight.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.entries.remove(key).is_some()
    }

    /// Drop every entry matching the predicate. Returns the number removed.
    pub fn invalidate_where<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        for flight in self.inflight.iter().filter(|flight| predicate(flight.key())) {
            flight.generation.fetch_add(1, Ordering::SeqCst);
        }
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries (expired entries count until touched).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len() as u64)
    }

    /// Return the cached value or run `init` once per key to produce it.
    ///
    /// Concurrent callers missing on the same key are serialized behind a
    /// per-key gate; after the first caller inserts, the others observe a
    /// [`CacheLookup::Hit`]. When `init` fails nothing is cached and the
    /// next waiter runs its own loader. When the key is invalidated while
    /// `init` runs, the caller still gets the value but it is not cached.
    ///
    /// Each call counts as exactly one hit or one miss.
    pub async fn get_or_try_insert_with<F, Fut, E>(
        &self,
        key: K,
        init: F,
    ) -> Result<CacheLookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.lookup(&key) {
            CacheCounters::bump(&self.counters.hits);
            return Ok(CacheLookup::Hit(value));
        }

        let flight = {
            let slot = self.inflight.entry(key.clone()).or_default();
            Arc::clone(slot.value())
        };
        let guard = flight.gate.lock().await;

        let result = match self.lookup(&key) {
            Some(value) => {
                CacheCounters::bump(&self.counters.hits);
                Ok(CacheLookup::Hit(value))
            }
            None => {
                CacheCounters::bump(&self.counters.misses);
                let generation = flight.generation.load(Ordering::SeqCst);
                match init().await {
                    Ok(value) => {
                        CacheCounters::bump(&self.counters.loads);
                        self.insert(key.clone(), value.clone());
                        // An invalidation bumps the generation before removing,
                        // so checking after our insert cannot miss one.
                        if flight.generation.load(Ordering::SeqCst) != generation {
                            self.entries.remove(&key);
                        }
                        Ok(CacheLookup::Loaded(value))
                    }
                    Err(err) => Err(err),
                }
            }
        };

        drop(guard);
        drop(flight);
        self.inflight
            .remove_if(&key, |_, flight| Arc::strong_count(flight) == 1);
        result
    }
}
