//! Cache Module
//!
//! Provides byte-bounded LRU storage and its thread-safe wrapper.

mod byteview;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use byteview::{ByteSize, ByteView};
pub use lru::{EvictionCallback, Keys, LruCache};
pub use stats::CacheStats;
pub use store::ConcurrentCache;
