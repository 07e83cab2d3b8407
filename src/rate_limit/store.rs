use crate::rate_limit::TokenBucket;
use dashmap::DashMap;
use moka::policy::EvictionPolicy;
use std::sync::Arc;
use std::time::Duration;

/// Storage for the API key → bucket map.
///
/// Implementations must make lookup-or-insert atomic per key: when several callers race
/// on a key that has no entry, `init` runs once and every caller receives the bucket it
/// produced.
pub trait BucketStore: Send + Sync + std::fmt::Debug {
    /// Return the bucket for `key`, building it with `init` if the key has no entry.
    fn get_or_insert_with(
        &self,
        key: &str,
        init: &mut dyn FnMut() -> Arc<TokenBucket>,
    ) -> Arc<TokenBucket>;

    /// Return the bucket for `key` without creating one.
    fn get(&self, key: &str) -> Option<Arc<TokenBucket>>;

    /// Number of live buckets. May be approximate for caching stores.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded sharded map. Entries live for the whole process.
///
/// Contention is per shard, so unrelated keys rarely wait on each other and never wait
/// on a registry-wide lock.
#[derive(Default, Debug)]
pub struct ConcurrentBucketStore {
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl ConcurrentBucketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BucketStore for ConcurrentBucketStore {
    fn get_or_insert_with(
        &self,
        key: &str,
        init: &mut dyn FnMut() -> Arc<TokenBucket>,
    ) -> Arc<TokenBucket> {
        // Read path first so the common case neither allocates nor takes a write lock.
        if let Some(existing) = self.buckets.get(key) {
            return existing.clone();
        }
        // The entry guard holds the shard write lock across `init` and the insert.
        self.buckets.entry(key.to_owned()).or_insert_with(|| init()).clone()
    }

    fn get(&self, key: &str) -> Option<Arc<TokenBucket>> {
        self.buckets.get(key).map(|entry| entry.clone())
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Size- and idle-bounded store backed by `moka`.
///
/// Eviction is LRU so a new key is always admitted; TinyLFU may refuse a rare key and
/// leave it with a fresh bucket on every request.
///
/// An evicted key gets a fresh, full bucket the next time it is seen, so the one-bucket-
/// per-key guarantee holds only while the entry is live.
#[derive(Debug, Clone)]
pub struct BoundedBucketStore {
    cache: moka::sync::Cache<String, Arc<TokenBucket>>,
}

impl BoundedBucketStore {
    /// Keep at most `max_keys` buckets, evicting the least valuable first.
    pub fn new(max_keys: u64) -> Self {
        Self {
            cache: moka::sync::Cache::builder()
                .max_capacity(max_keys)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// Like [`BoundedBucketStore::new`], additionally dropping buckets not touched for `idle`.
    pub fn with_idle_ttl(max_keys: u64, idle: Duration) -> Self {
        Self {
            cache: moka::sync::Cache::builder()
                .max_capacity(max_keys)
                .eviction_policy(EvictionPolicy::lru())
                .time_to_idle(idle)
                .build(),
        }
    }

    /// Apply pending evictions now instead of lazily on later writes.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl BucketStore for BoundedBucketStore {
    fn get_or_insert_with(
        &self,
        key: &str,
        init: &mut dyn FnMut() -> Arc<TokenBucket>,
    ) -> Arc<TokenBucket> {
        // get_with coalesces concurrent initializations of the same key.
        self.cache.get_with_by_ref(key, || init())
    }

    fn get(&self, key: &str) -> Option<Arc<TokenBucket>> {
        self.cache.get(key)
    }

    fn len(&self) -> usize {
        usize::try_from(self.cache.entry_count()).unwrap_or(usize::MAX)
    }
}
