//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, gets, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time metrics of a [`ConcurrentCache`](crate::cache::ConcurrentCache).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Bytes currently charged against the budget
    pub bytes: usize,
    /// Current number of entries in the cache
    pub items: usize,
    /// Number of lookups
    pub gets: u64,
    /// Number of lookups that found the key
    pub hits: u64,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Misses ==
    /// Lookups that did not find the key.
    pub fn misses(&self) -> u64 {
        self.gets - self.hits
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / gets, or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }

    // == Record Lookup ==
    /// Counts one lookup and whether it hit.
    pub fn record_get(&mut self, hit: bool) {
        self.gets += 1;
        if hit {
            self.hits += 1;
        }
    }

    // == Record Evictions ==
    /// Adds `count` to the eviction counter.
    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }
}
