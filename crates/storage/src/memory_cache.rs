//! In-memory LRU cache for geoprocessing results.
//!
//! Used for single-process runs and tests. Entries without a TTL live until
//! evicted by LRU order; entries with a TTL expire lazily on read.

use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use geop_common::GeopResult;

use crate::cache::CacheStore;

struct CachedValue {
    value: Value,
    inserted_at: Instant,
    ttl: Option<Duration>,
}

impl CachedValue {
    fn is_expired(&self) -> bool {
        self.ttl
            .map(|ttl| self.inserted_at.elapsed() > ttl)
            .unwrap_or(false)
    }
}

/// Statistics for the memory cache.
#[derive(Debug, Default)]
pub struct MemoryCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    pub expired: AtomicU64,
}

impl MemoryCacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Cache hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            (self.hits() as f64 / total as f64) * 100.0
        }
    }
}

/// In-memory LRU implementation of [`CacheStore`].
#[derive(Clone)]
pub struct MemoryCache {
    cache: Arc<RwLock<LruCache<String, CachedValue>>>,
    stats: Arc<MemoryCacheStats>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
            stats: Arc::new(MemoryCacheStats::default()),
        }
    }

    pub fn stats(&self) -> &MemoryCacheStats {
        &self.stats
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// All live keys, most recently used first.
    pub async fn keys(&self) -> Vec<String> {
        self.cache
            .read()
            .await
            .iter()
            .filter(|(_, v)| !v.is_expired())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> GeopResult<Option<Value>> {
        let mut cache = self.cache.write().await;

        match cache.get(key) {
            Some(cached) if cached.is_expired() => {
                cache.pop(key);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(cached) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(cached.value.clone()))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> GeopResult<()> {
        let mut cache = self.cache.write().await;
        cache.put(
            key.to_string(),
            CachedValue {
                value: value.clone(),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> GeopResult<()> {
        self.cache.write().await.pop(key);
        Ok(())
    }
}
