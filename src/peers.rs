//! Peer Selection Module
//!
//! Decides which peer owns a key and fetches values from remote peers.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::Url;
use tracing::{debug, info};

use crate::consistenthash::HashRing;
use crate::error::{CacheError, Result};

/// Upper bound on a single peer fetch.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

// == Peer Traits ==
/// Fetches a value from one remote peer.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Address identifying the peer on the ring.
    fn addr(&self) -> &str;

    async fn fetch(&self, namespace: &str, key: &str) -> Result<Bytes>;
}

/// Chooses the remote peer responsible for a key.
pub trait PeerPicker: Send + Sync {
    /// Returns the owning peer, or None when the key is owned by this
    /// process or no peers are known.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

// == HTTP Getter ==
/// Fetches `<peer><base_path>/<namespace>/<key>` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGetter {
    addr: String,
    base_url: Url,
    client: reqwest::Client,
}

impl HttpGetter {
    pub fn new(addr: &str, base_path: &str, client: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(&format!("{addr}{base_path}"))
            .map_err(|err| CacheError::InvalidConfig(format!("bad peer address {addr}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CacheError::InvalidConfig(format!(
                "peer address {addr} cannot be used as a base URL"
            )));
        }

        Ok(Self {
            addr: addr.to_string(),
            base_url,
            client,
        })
    }

    /// Builds the request URL, percent-encoding both segments.
    pub fn url_for(&self, namespace: &str, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(namespace).push(key);
        }
        url
    }

    fn failure(&self, message: impl Into<String>) -> CacheError {
        CacheError::Peer {
            peer: self.addr.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn fetch(&self, namespace: &str, key: &str) -> Result<Bytes> {
        let url = self.url_for(namespace, key);
        debug!(%url, "fetching from peer");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.failure(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(format!("server returned {status}: {body}")));
        }

        response
            .bytes()
            .await
            .map_err(|err| self.failure(format!("reading response body: {err}")))
    }
}

// == HTTP Pool ==
#[derive(Debug)]
struct PoolState {
    ring: HashRing,
    getters: HashMap<String, Arc<HttpGetter>>,
}

/// A [`PeerPicker`] over a set of HTTP peers placed on a [`HashRing`].
///
/// The peer set can be replaced at any time with [`set_peers`](Self::set_peers);
/// each call rebuilds the ring from scratch, which is also how peers are
/// removed.
pub struct HttpPool {
    /// This process's own address, as it appears in the peer list
    self_addr: String,
    base_path: String,
    replicas: usize,
    client: reqwest::Client,
    state: RwLock<PoolState>,
}

impl HttpPool {
    // == Constructor ==
    /// Creates a pool whose peer requests fail after [`DEFAULT_PEER_TIMEOUT`].
    pub fn new(self_addr: &str, base_path: &str, replicas: usize) -> Result<Self> {
        Self::with_request_timeout(self_addr, base_path, replicas, DEFAULT_PEER_TIMEOUT)
    }

    /// Creates a pool whose peer requests fail after `timeout`.
    pub fn with_request_timeout(
        self_addr: &str,
        base_path: &str,
        replicas: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CacheError::InvalidConfig(format!("building peer client: {err}")))?;

        Ok(Self {
            self_addr: normalize_addr(self_addr),
            base_path: base_path.to_string(),
            replicas,
            client,
            state: RwLock::new(PoolState {
                ring: HashRing::new(replicas),
                getters: HashMap::new(),
            }),
        })
    }

    // == Set Peers ==
    /// Replaces the peer set. Include this process's own address so it owns
    /// its share of the keys.
    pub fn set_peers<I, S>(&self, peers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peers: Vec<String> = peers
            .into_iter()
            .map(|peer| normalize_addr(peer.as_ref()))
            .collect();

        let mut getters = HashMap::with_capacity(peers.len());
        for peer in &peers {
            let getter = HttpGetter::new(peer, &self.base_path, self.client.clone())?;
            getters.insert(peer.clone(), Arc::new(getter));
        }

        let mut ring = HashRing::new(self.replicas);
        ring.add(&peers);

        *self.state.write() = PoolState { ring, getters };
        info!(self_addr = %self.self_addr, peers = ?peers, "peer set updated");
        Ok(())
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Number of distinct peers, including this process if listed.
    pub fn peer_count(&self) -> usize {
        self.state.read().getters.len()
    }

    /// Address owning `key`, whether local or remote.
    pub fn owner_of(&self, key: &str) -> Option<String> {
        self.state.read().ring.get(key).map(str::to_string)
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read();
        let peer = state.ring.get(key)?;
        if peer == self.self_addr {
            return None;
        }

        debug!(peer, key, "picked remote peer");
        let getter = state.getters.get(peer)?;
        Some(Arc::clone(getter) as Arc<dyn PeerGetter>)
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_addr", &self.self_addr)
            .field("base_path", &self.base_path)
            .field("replicas", &self.replicas)
            .field("peers", &self.peer_count())
            .finish()
    }
}

fn normalize_addr(addr: &str) -> String {
    addr.trim().trim_end_matches('/').to_string()
}

/// Whether `peer` names the same loopback listener as `self_addr` under a
/// different spelling, e.g. `http://localhost:3000` for
/// `http://127.0.0.1:3000`. Such a peer would own keys that route back here.
pub fn is_self_alias(self_addr: &str, peer: &str) -> bool {
    let (Ok(own), Ok(other)) = (Url::parse(self_addr), Url::parse(peer)) else {
        return false;
    };
    if normalize_addr(self_addr) == normalize_addr(peer) {
        return false;
    }

    own.port_or_known_default() == other.port_or_known_default()
        && is_loopback(&own)
        && is_loopback(&other)
}

fn is_loopback(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback() || ip.is_unspecified())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_segments() {
        let getter =
            HttpGetter::new("http://127.0.0.1:3000", "/_peer_cache", reqwest::Client::new())
                .unwrap();

        let url = getter.url_for("scores", "a b/c");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:3000/_peer_cache/scores/a%20b%2Fc"
        );
    }

    #[test]
    fn test_bad_peer_address() {
        let result = HttpGetter::new("not a url", "/_peer_cache", reqwest::Client::new());
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_pool_picks_nothing() {
        let pool = HttpPool::new("http://a:1", "/_peer_cache", 10).unwrap();
        assert!(pool.pick_peer("key").is_none());
        assert_eq!(pool.owner_of("key"), None);
    }

    #[test]
    fn test_self_owned_keys_are_local() {
        let pool = HttpPool::new("http://a:1/", "/_peer_cache", 10).unwrap();
        pool.set_peers(["http://a:1"]).unwrap();

        for i in 0..100 {
            assert!(pool.pick_peer(&format!("key{i}")).is_none());
        }
    }

    #[test]
    fn test_remote_keys_pick_owner() {
        let pool = HttpPool::new("http://a:1", "/_peer_cache", 50).unwrap();
        pool.set_peers(["http://a:1", "http://b:2", "http://c:3"])
            .unwrap();
        assert_eq!(pool.peer_count(), 3);

        let mut remote = 0;
        for i in 0..300 {
            let key = format!("key{i}");
            let owner = pool.owner_of(&key).unwrap();
            match pool.pick_peer(&key) {
                Some(peer) => {
                    assert_eq!(peer.addr(), owner);
                    remote += 1;
                }
                None => assert_eq!(owner, "http://a:1"),
            }
        }
        assert!(remote > 0);
    }

    #[test]
    fn test_set_peers_rebuilds_ring() {
        let pool = HttpPool::new("http://a:1", "/_peer_cache", 50).unwrap();
        pool.set_peers(["http://a:1", "http://b:2"]).unwrap();
        pool.set_peers(["http://a:1"]).unwrap();

        assert_eq!(pool.peer_count(), 1);
        for i in 0..100 {
            assert!(pool.pick_peer(&format!("key{i}")).is_none());
        }
    }

    #[test]
    fn test_request_timeout_is_configurable() {
        let pool = HttpPool::with_request_timeout(
            "http://a:1",
            "/_peer_cache",
            5,
            Duration::from_millis(250),
        )
        .unwrap();
        assert_eq!(pool.self_addr(), "http://a:1");
    }

    #[test]
    fn test_self_alias_detection() {
        let own = "http://127.0.0.1:3000";
        assert!(is_self_alias(own, "http://localhost:3000"));
        assert!(is_self_alias(own, "http://[::1]:3000/"));
        assert!(is_self_alias(own, "http://0.0.0.0:3000"));

        assert!(!is_self_alias(own, "http://127.0.0.1:3000/"));
        assert!(!is_self_alias(own, "http://localhost:3001"));
        assert!(!is_self_alias(own, "http://10.0.0.7:3000"));
        assert!(!is_self_alias(own, "not a url"));
    }
}
