//! Response cache keyed by normalized query text.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::config::CacheConfig;

/// Where a cached answer originally came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachedSource {
    /// Generated by the model.
    Model,
    /// Produced by the rule table.
    Fallback,
}

#[derive(Clone, Debug)]
struct CacheEntry {
    text: String,
    source: CachedSource,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// A cache hit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CachedAnswer {
    /// Cached reply text.
    pub text: String,
    /// Origin of the cached reply.
    pub source: CachedSource,
}

/// Counters reported by [`ResponseCache::stats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CacheStats {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Entries currently held (expired ones included until swept).
    pub entries: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
}

/// Normalize a query into its cache key: trimmed and lowercased.
#[must_use]
pub fn cache_key(query: &str) -> String {
    query.trim().to_lowercase()
}

/// LRU cache with per-entry TTL and per-key single-flight locks.
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    fallback_ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry>>,
    inflight: Arc<DashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache from configuration. A zero capacity is raised to one.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_seconds),
            fallback_ttl: Duration::from_secs(config.fallback_ttl_seconds),
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Arc::new(DashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether lookups and inserts are active.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a key, counting the hit or miss.
    pub async fn get(&self, key: &str) -> Option<CachedAnswer> {
        let found = self.lookup(key).await;
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Look up a key again after winning its single-flight lock. Only hits are counted.
    pub async fn recheck(&self, key: &str) -> Option<CachedAnswer> {
        let found = self.lookup(key).await;
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    async fn lookup(&self, key: &str) -> Option<CachedAnswer> {
        if !self.enabled {
            return None;
        }
        let mut entries = self.entries.lock().await;
        match entries.peek(key).map(CacheEntry::is_expired) {
            Some(true) => {
                entries.pop(key);
                None
            }
            Some(false) => entries.get(key).map(|entry| CachedAnswer {
                text: entry.text.clone(),
                source: entry.source,
            }),
            None => None,
        }
    }

    /// Store an answer. Fallback answers use the shorter TTL.
    pub async fn insert(&self, key: String, text: String, source: CachedSource) {
        if !self.enabled {
            return;
        }
        let ttl = match source {
            CachedSource::Model => self.ttl,
            CachedSource::Fallback => self.fallback_ttl,
        };
        let entry = CacheEntry {
            text,
            source,
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.put(key, entry);
    }

    /// Serialize computations for one key. Callers holding the guard should
    /// [`recheck`](Self::recheck) before computing.
    pub async fn lock_key(&self, key: &str) -> KeyGuard {
        let lock = Arc::clone(
            self.inflight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = lock.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            inflight: Arc::clone(&self.inflight),
            _guard: guard,
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Remove every entry and reset counters.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Current counters.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        CacheStats {
            enabled: self.enabled,
            entries: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive right to compute the answer for one cache key.
pub struct KeyGuard {
    key: String,
    inflight: Arc<DashMap<String, Arc<Mutex<()>>>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // One reference in the map, one held by this guard: nobody else is waiting.
        self.inflight
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            capacity: 2,
            ttl_seconds: 60,
            fallback_ttl_seconds: 0,
        }
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(cache_key("  What's The PRICE?\n"), "what's the price?");
    }

    #[tokio::test]
    async fn test_hit_after_insert_and_counters() {
        let cache = ResponseCache::new(&config());
        assert!(cache.get("q").await.is_none());
        cache.insert("q".to_string(), "a".to_string(), CachedSource::Model).await;

        let hit = cache.get("q").await;
        assert_eq!(hit.map(|h| h.text), Some("a".to_string()));
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recent() {
        let cache = ResponseCache::new(&config());
        cache.insert("a".to_string(), "1".to_string(), CachedSource::Model).await;
        cache.insert("b".to_string(), "2".to_string(), CachedSource::Model).await;
        let _ = cache.get("a").await;
        cache.insert("c".to_string(), "3".to_string(), CachedSource::Model).await;

        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_entries_expire_sooner() {
        let cache = ResponseCache::new(&config());
        cache.insert("f".to_string(), "fb".to_string(), CachedSource::Fallback).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get("f").await.is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = ResponseCache::new(&config());
        cache.insert("f".to_string(), "fb".to_string(), CachedSource::Fallback).await;
        cache.insert("m".to_string(), "ok".to_string(), CachedSource::Model).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.stats().await.entries, 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_stores_nothing() {
        let cache = ResponseCache::new(&CacheConfig {
            enabled: false,
            ..config()
        });
        cache.insert("q".to_string(), "a".to_string(), CachedSource::Model).await;
        assert!(cache.get("q").await.is_none());
    }

    #[tokio::test]
    async fn test_key_lock_is_released() {
        let cache = ResponseCache::new(&config());
        drop(cache.lock_key("q").await);
        assert!(cache.inflight.is_empty());
        let _again = cache.lock_key("q").await;
    }
}
