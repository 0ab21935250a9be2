//! LRU analysis cache with TTL
//!
//! Memoizes per-symbol analyses for a bounded window.
//! - Key: `{symbol}:{variant}`, e.g. `AAPL:ml` or `AAPL:30d:plain`
//! - TTL: 15 minutes by default
//! - Entries past their TTL are dropped on read

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(cap) => cap,
    None => unreachable!(),
};

/// Cache entry with timestamp for TTL checking
#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    cached_at: DateTime<Utc>,
}

/// LRU cache for analysis results
pub struct AnalysisCache<T: Clone> {
    cache: Mutex<LruCache<String, CacheEntry<T>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> AnalysisCache<T> {
    /// Create a new cache
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries
    /// * `ttl_seconds` - Time-to-live in seconds for each entry
    pub fn new(capacity: usize, ttl_seconds: i64) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
            ttl: Duration::seconds(ttl_seconds),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached value if it exists and hasn't expired
    pub fn get(&self, key: &str) -> Option<T> {
        let mut cache = self.cache.lock();

        if let Some(entry) = cache.get(key) {
            let age = Utc::now() - entry.cached_at;
            if age < self.ttl {
                tracing::trace!(key = key, age_secs = age.num_seconds(), "Cache hit");
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            tracing::trace!(key = key, "Cache entry expired");
            cache.pop(key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a value into the cache
    pub fn insert(&self, key: String, value: T) {
        let entry = CacheEntry {
            value,
            cached_at: Utc::now(),
        };
        self.cache.lock().put(key, entry);
    }

    /// Remove an entry from the cache
    pub fn invalidate(&self, key: &str) {
        self.cache.lock().pop(key);
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut cache = self.cache.lock();
        let keys: Vec<String> = cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            cache.pop(&key);
        }
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.cache.lock().clear();
        tracing::debug!("Analysis cache cleared");
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Entry counts plus hits and misses since creation (expired reads are misses)
    pub fn stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}
