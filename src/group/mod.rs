//! Namespace Module
//!
//! A namespace ties a loader to a bounded cache, a request coalescer and,
//! optionally, a set of peers that share ownership of the key space.
//!
//! # Get Path
//! 1. Reject empty keys
//! 2. Answer from the main cache on a hit
//! 3. On a miss, coalesce concurrent loads of the key
//! 4. Fetch from the owning peer, falling back to the local loader
//! 5. Cache locally loaded values and return
//!
//! Requests arriving from peers use [`Namespace::get_local`], which skips
//! step 4.

mod loader;
mod registry;
mod stats;

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{ByteView, ConcurrentCache};
use crate::error::{CacheError, Result};
use crate::peers::{PeerGetter, PeerPicker};
use crate::singleflight::RequestCoalescer;

pub use loader::{DirectoryLoader, Loader, LoaderFn};
pub use registry::Registry;
pub use stats::NamespaceStats;
use stats::Counters;

// == Namespace ==
/// A named cache domain with its own loader and byte budget.
pub struct Namespace {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: ConcurrentCache,
    loads: RequestCoalescer<ByteView>,
    /// Loads made on behalf of peers, never forwarded
    peer_serves: RequestCoalescer<ByteView>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    counters: Counters,
}

impl Namespace {
    // == Builder ==
    /// Starts configuring a namespace called `name`.
    pub fn builder(name: impl Into<String>) -> NamespaceBuilder {
        NamespaceBuilder {
            name: name.into(),
            cache_bytes: 0,
            loader: None,
            load_timeout: None,
            peers: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Register Peers ==
    /// Enables remote dispatch through `peers`. Can only be done once.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<()> {
        self.peers
            .set(peers)
            .map_err(|_| CacheError::PeersAlreadyRegistered(self.name.clone()))
    }

    // == Get ==
    /// Returns the value for `key`, loading it on a cache miss.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        match self.lookup(key)? {
            Some(value) => Ok(value),
            None => self.load(key).await,
        }
    }

    /// Returns the value for `key` without ever consulting peers.
    ///
    /// Answers requests that arrived from a peer, so a key is forwarded at
    /// most once. These loads are coalesced apart from [`get`](Self::get):
    /// a request looping back to this node must not wait on its own
    /// forwarding load.
    pub async fn get_local(&self, key: &str) -> Result<ByteView> {
        if let Some(value) = self.lookup(key)? {
            return Ok(value);
        }

        Counters::incr(&self.counters.loads);
        self.peer_serves
            .execute(key, || async {
                if let Some(value) = self.main_cache.get(key) {
                    Counters::incr(&self.counters.cache_hits);
                    return Ok(value);
                }
                Counters::incr(&self.counters.loads_deduped);
                self.get_locally(key).await
            })
            .await
    }

    /// Counts a get that arrived over the peer transport.
    pub fn record_server_request(&self) {
        Counters::incr(&self.counters.server_requests);
    }

    // == Stats ==
    pub fn stats(&self) -> NamespaceStats {
        self.counters.snapshot(self.main_cache.stats())
    }

    fn lookup(&self, key: &str) -> Result<Option<ByteView>> {
        Counters::incr(&self.counters.gets);
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        let value = self.main_cache.get(key);
        if value.is_some() {
            Counters::incr(&self.counters.cache_hits);
            debug!(namespace = %self.name, key, "cache hit");
        } else {
            debug!(namespace = %self.name, key, "cache miss");
        }
        Ok(value)
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        Counters::incr(&self.counters.loads);

        self.loads
            .execute(key, || async {
                // An earlier generation may have filled the cache meanwhile
                if let Some(value) = self.main_cache.get(key) {
                    Counters::incr(&self.counters.cache_hits);
                    return Ok(value);
                }
                Counters::incr(&self.counters.loads_deduped);

                if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
                    match self.get_from_peer(peer.as_ref(), key).await {
                        Ok(value) => {
                            Counters::incr(&self.counters.peer_loads);
                            return Ok(value);
                        }
                        Err(err) => {
                            Counters::incr(&self.counters.peer_errors);
                            warn!(
                                namespace = %self.name,
                                key,
                                peer = peer.addr(),
                                error = %err,
                                "peer fetch failed, loading locally"
                            );
                        }
                    }
                }

                self.get_locally(key).await
            })
            .await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let bytes = peer.fetch(&self.name, key).await?;
        Ok(ByteView::from(bytes))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = match self.loader.load(key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                Counters::incr(&self.counters.local_load_errors);
                return Err(CacheError::loader(err));
            }
        };
        Counters::incr(&self.counters.local_loads);

        let value = ByteView::copy_from(&bytes);
        self.main_cache.add(key, value.clone());
        Ok(value)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("main_cache", &self.main_cache)
            .field("peers", &self.peers.get().is_some())
            .finish()
    }
}

// == Namespace Builder ==
/// Configuration for a [`Namespace`]; see [`Namespace::builder`].
pub struct NamespaceBuilder {
    name: String,
    cache_bytes: usize,
    loader: Option<Arc<dyn Loader>>,
    load_timeout: Option<Duration>,
    peers: Option<Arc<dyn PeerPicker>>,
}

impl NamespaceBuilder {
    /// Byte budget of the main cache, zero for unbounded.
    pub fn cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache_bytes = cache_bytes;
        self
    }

    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn shared_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Bounds how long a caller waits on someone else's in-flight load.
    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    pub fn peers(mut self, peers: Arc<dyn PeerPicker>) -> Self {
        self.peers = Some(peers);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Build ==
    /// Validates the configuration and creates the namespace.
    pub fn build(self) -> Result<Namespace> {
        if self.name.is_empty() {
            return Err(CacheError::InvalidConfig(
                "namespace name is empty".to_string(),
            ));
        }
        let loader = self.loader.ok_or_else(|| {
            CacheError::InvalidConfig(format!("namespace {} has no loader", self.name))
        })?;

        let load_timeout = self.load_timeout;
        let coalescer = move || match load_timeout {
            Some(timeout) => RequestCoalescer::with_wait_timeout(timeout),
            None => RequestCoalescer::new(),
        };
        let peers = OnceLock::new();
        if let Some(picker) = self.peers {
            let _ = peers.set(picker);
        }

        info!(
            namespace = %self.name,
            cache_bytes = self.cache_bytes,
            "namespace created"
        );
        Ok(Namespace {
            name: self.name,
            loader,
            main_cache: ConcurrentCache::new(self.cache_bytes),
            loads: coalescer(),
            peer_serves: coalescer(),
            peers,
            counters: Counters::default(),
        })
    }
}

impl fmt::Debug for NamespaceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceBuilder")
            .field("name", &self.name)
            .field("cache_bytes", &self.cache_bytes)
            .field("has_loader", &self.loader.is_some())
            .field("load_timeout", &self.load_timeout)
            .finish()
    }
}
