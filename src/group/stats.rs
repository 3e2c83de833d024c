//! Namespace Statistics
//!
//! Lock-free counters describing how a namespace served its requests.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::CacheStats;

// == Counters ==
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub gets: AtomicU64,
    pub cache_hits: AtomicU64,
    pub loads: AtomicU64,
    pub loads_deduped: AtomicU64,
    pub local_loads: AtomicU64,
    pub local_load_errors: AtomicU64,
    pub peer_loads: AtomicU64,
    pub peer_errors: AtomicU64,
    pub server_requests: AtomicU64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, main_cache: CacheStats) -> NamespaceStats {
        let read = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        NamespaceStats {
            gets: read(&self.gets),
            cache_hits: read(&self.cache_hits),
            loads: read(&self.loads),
            loads_deduped: read(&self.loads_deduped),
            local_loads: read(&self.local_loads),
            local_load_errors: read(&self.local_load_errors),
            peer_loads: read(&self.peer_loads),
            peer_errors: read(&self.peer_errors),
            server_requests: read(&self.server_requests),
            main_cache,
        }
    }
}

// == Namespace Stats ==
/// Point-in-time view of a namespace's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NamespaceStats {
    /// Any get request, including from peers
    pub gets: u64,
    /// Gets answered from the cache
    pub cache_hits: u64,
    /// Gets that missed the cache and went to the coalescer
    pub loads: u64,
    /// Loads actually executed after coalescing
    pub loads_deduped: u64,
    /// Successful local loader calls
    pub local_loads: u64,
    /// Failed local loader calls
    pub local_load_errors: u64,
    /// Values fetched from the owning peer
    pub peer_loads: u64,
    /// Failed peer fetches
    pub peer_errors: u64,
    /// Gets that arrived over the peer transport
    pub server_requests: u64,
    pub main_cache: CacheStats,
}
