use crate::{error::ResolveError, resolver::*};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

// Caches smaller than this stay in one shard so eviction is exact LRU.
const MIN_SHARD_CAPACITY: usize = 256;
const MAX_SHARDS: usize = 16;

/// Resolver that remembers answers from its inner resolver.
///
/// Positive answers go to the hit cache, "nothing found" answers to the
/// separately sized miss cache, each with its own TTL. Errors are never
/// cached so the next lookup reaches the backend again. A tier with a
/// capacity of zero is disabled.
pub struct CacheResolver<R> {
    inner: R,
    hits: Option<TtlCache<Vec<String>>>,
    misses: Option<TtlCache<()>>,
}

impl<R> CacheResolver<R> {
    pub fn new(
        resolver: R,
        hit_capacity: usize,
        hit_ttl: Duration,
        miss_capacity: usize,
        miss_ttl: Duration,
    ) -> Self {
        Self {
            inner: resolver,
            hits: TtlCache::new(hit_capacity, hit_ttl),
            misses: TtlCache::new(miss_capacity, miss_ttl),
        }
    }

    /// Number of live-or-not-yet-evicted entries in the hit and miss caches.
    pub fn cached_entries(&self) -> (usize, usize) {
        (
            self.hits.as_ref().map_or(0, TtlCache::len),
            self.misses.as_ref().map_or(0, TtlCache::len),
        )
    }
}

impl<R: Resolver> CacheResolver<R> {
    async fn lookup(&self, direction: Direction, target: &str) -> LookupResult {
        let key = CacheKey::new(direction, target);

        if let Some(values) = self.hits.as_ref().and_then(|c| c.get(&key)) {
            trace!(%direction, target, "Cached response");
            return Ok(values);
        }

        if let Some(()) = self.misses.as_ref().and_then(|c| c.get(&key)) {
            trace!(%direction, target, "Cached negative response");
            return Ok(Vec::new());
        }

        // If no valid cache entry was found, delegate to the inner resolver
        match direction.lookup(&self.inner, target).await {
            Ok(values) if !values.is_empty() => {
                if let Some(hits) = &self.hits {
                    hits.put(key, values.clone());
                }
                Ok(values)
            }
            Ok(_) | Err(ResolveError::NoResolution) => {
                if let Some(misses) = &self.misses {
                    misses.put(key, ());
                }
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<R: Resolver> Resolver for CacheResolver<R> {
    async fn resolve(&self, hostname: &str) -> LookupResult {
        self.lookup(Direction::Forward, hostname).await
    }

    async fn reverse(&self, ip: &str) -> LookupResult {
        self.lookup(Direction::Reverse, ip).await
    }

    fn name(&self) -> &'static str {
        "cache"
    }

    fn close(&self) -> Result<(), ResolveError> {
        self.inner.close()
    }
}

/// Bounded TTL cache split into independently locked shards, so lookups of
/// different keys rarely wait on each other.
struct TtlCache<V> {
    shards: Box<[Mutex<Cache<V>>]>,
    ttl: Duration,
    hasher: RandomState,
}

impl<V: Clone> TtlCache<V> {
    fn new(capacity: usize, ttl: Duration) -> Option<Self> {
        if capacity == 0 {
            return None;
        }

        let shard_count = (capacity / MIN_SHARD_CAPACITY).clamp(1, MAX_SHARDS);
        let shards = (0..shard_count)
            .map(|i| {
                let share = capacity / shard_count + usize::from(i < capacity % shard_count);
                Mutex::new(Cache::new(share))
            })
            .collect();

        Some(Self {
            shards,
            ttl,
            hasher: RandomState::new(),
        })
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<Cache<V>> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    fn get(&self, key: &CacheKey) -> Option<V> {
        self.shard(key).lock().get(key, Instant::now())
    }

    fn put(&self, key: CacheKey, value: V) {
        // A TTL past the end of the clock never expires
        let expires_at = Instant::now().checked_add(self.ttl);
        self.shard(&key).lock().put(key, value, expires_at);
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().data.len()).sum()
    }
}

// Keep up to `capacity` entries. If the capacity is reached, the least recently used entry is
// dropped to make room. Expired entries are dropped when next looked up.
struct Cache<V> {
    data: HashMap<CacheKey, CacheEntry<V>>,
    recency: BTreeMap<u64, CacheKey>,
    clock: u64,
    capacity: usize,
}

impl<V: Clone> Cache<V> {
    fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Cache {
            data: HashMap::with_capacity(capacity.min(4096)),
            recency: BTreeMap::new(),
            clock: 0,
            capacity,
        }
    }

    fn get(&mut self, key: &CacheKey, now: Instant) -> Option<V> {
        let entry = self.data.get_mut(key)?;
        self.recency.remove(&entry.last_used);

        if entry.is_expired(now) {
            self.data.remove(key);
            return None;
        }

        self.clock += 1;
        entry.last_used = self.clock;
        self.recency.insert(self.clock, key.clone());
        Some(entry.value.clone())
    }

    fn put(&mut self, key: CacheKey, value: V, expires_at: Option<Instant>) {
        if let Some(previous) = self.data.remove(&key) {
            self.recency.remove(&previous.last_used);
        }

        // If needed, make space for the new cache item by dropping least recently used entries
        while self.data.len() >= self.capacity {
            match self.recency.pop_first() {
                Some((_, lru)) => {
                    self.data.remove(&lru);
                }
                None => break,
            }
        }
        debug_assert_eq!(self.data.len(), self.recency.len());

        self.clock += 1;
        self.recency.insert(self.clock, key.clone());
        self.data.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                last_used: self.clock,
            },
        );
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct CacheKey {
    direction: Direction,
    // Hostnames compare case-insensitively (RFC 4343), and IPs are looked up by their textual
    // form, so both are keyed on the trimmed ASCII-lowercased target.
    target_ascii_lowercase: String,
}

impl CacheKey {
    fn new(direction: Direction, target: &str) -> Self {
        Self {
            direction,
            target_ascii_lowercase: target.trim().to_ascii_lowercase(),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
    last_used: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}
