//! Concurrent Cache Module
//!
//! Thread-safe wrapper around the LRU store.

use parking_lot::Mutex;

use crate::cache::{ByteView, CacheStats, LruCache};

#[derive(Debug, Default)]
struct Inner {
    /// Created on the first add
    lru: Option<LruCache<ByteView>>,
    stats: CacheStats,
}

// == Concurrent Cache ==
/// An [`LruCache`] of [`ByteView`]s guarded by a single mutex.
///
/// Lookups reorder the recency list, so reads take the same exclusive lock
/// as writes. Every operation is serialized; there is no sharding.
#[derive(Debug)]
pub struct ConcurrentCache {
    max_bytes: usize,
    inner: Mutex<Inner>,
}

impl ConcurrentCache {
    // == Constructor ==
    /// Creates a cache with a byte budget. Nothing is allocated until the
    /// first [`add`](Self::add); zero means unbounded.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(Inner::default()),
        }
    }

    // == Add ==
    /// Stores `value` under `key`, evicting older entries as needed.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut inner = self.inner.lock();
        let max_bytes = self.max_bytes;
        let evicted = inner
            .lru
            .get_or_insert_with(|| LruCache::new(max_bytes))
            .add(key, value);
        inner.stats.record_evictions(evicted);
    }

    // == Get ==
    /// Returns the value for `key`, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut inner = self.inner.lock();
        let value = inner.lru.as_mut().and_then(|lru| lru.get(key).cloned());
        inner.stats.record_get(value.is_some());
        value
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let mut stats = inner.stats.clone();
        if let Some(lru) = inner.lru.as_ref() {
            stats.bytes = lru.bytes();
            stats.items = lru.len();
        }
        stats
    }

    /// Configured byte budget.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Whether the underlying store has been constructed yet.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().lru.is_some()
    }
}
