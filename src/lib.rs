//! Peer Cache - A distributed, read-through, in-memory cache
//!
//! Keys are partitioned across peers with consistent hashing. Each key is
//! loaded at most once per burst of concurrent misses, cached under a byte
//! budget with LRU eviction, and served to other peers over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod consistenthash;
pub mod error;
pub mod group;
pub mod models;
pub mod peers;
pub mod singleflight;

pub use api::{create_router, AppState};
pub use cache::{ByteView, ConcurrentCache, LruCache};
pub use config::Config;
pub use consistenthash::HashRing;
pub use error::{CacheError, Result};
pub use group::{DirectoryLoader, Loader, LoaderFn, Namespace, NamespaceBuilder, Registry};
pub use peers::{HttpGetter, HttpPool, PeerGetter, PeerPicker};
pub use singleflight::RequestCoalescer;
