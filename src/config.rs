//! Configuration Module
//!
//! Handles loading and managing node configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::peers::is_self_alias;

/// Node configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// This node's address as it appears in the peer list
    pub self_addr: String,
    /// Addresses of every node in the cluster (may include this one)
    pub peers: Vec<String>,
    /// Byte budget of the namespace's main cache (0 = unlimited)
    pub cache_bytes: usize,
    /// Virtual nodes per peer on the hash ring
    pub replicas: usize,
    /// Prefix of the peer endpoint
    pub base_path: String,
    /// Name of the namespace served by this node
    pub namespace: String,
    /// Directory the namespace loads missing keys from
    pub data_dir: PathBuf,
    /// Per-waiter timeout on coalesced loads in milliseconds (0 = wait forever)
    pub load_timeout_ms: u64,
    /// Upper bound on one fetch from a peer in milliseconds
    pub peer_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SELF_ADDR` - This node's address (default: `http://127.0.0.1:<port>`)
    /// - `PEERS` - Comma separated peer addresses (default: none)
    /// - `CACHE_BYTES` - Main cache budget in bytes (default: 64 MiB)
    /// - `REPLICAS` - Virtual nodes per peer (default: 50)
    /// - `BASE_PATH` - Peer endpoint prefix (default: `/_peer_cache`)
    /// - `NAMESPACE` - Served namespace (default: `default`)
    /// - `DATA_DIR` - Loader source directory (default: `./data`)
    /// - `LOAD_TIMEOUT_MS` - Coalesced wait timeout (default: 0, disabled)
    /// - `PEER_TIMEOUT_MS` - Peer fetch timeout (default: 5000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let server_port = parse_var(&lookup, "SERVER_PORT").unwrap_or(defaults.server_port);
        let self_addr = lookup("SELF_ADDR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("http://127.0.0.1:{server_port}"));
        let peers = lookup("PEERS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            server_port,
            self_addr,
            peers,
            cache_bytes: parse_var(&lookup, "CACHE_BYTES").unwrap_or(defaults.cache_bytes),
            replicas: parse_var(&lookup, "REPLICAS").unwrap_or(defaults.replicas),
            base_path: lookup("BASE_PATH").unwrap_or(defaults.base_path),
            namespace: lookup("NAMESPACE").unwrap_or(defaults.namespace),
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            load_timeout_ms: parse_var(&lookup, "LOAD_TIMEOUT_MS")
                .unwrap_or(defaults.load_timeout_ms),
            peer_timeout_ms: parse_var(&lookup, "PEER_TIMEOUT_MS")
                .unwrap_or(defaults.peer_timeout_ms),
        }
    }

    /// Checks the values that would otherwise fail later at bind or request time.
    pub fn validate(&self) -> Result<()> {
        if !self.base_path.starts_with('/') || self.base_path.len() < 2 {
            return Err(CacheError::InvalidConfig(format!(
                "base path {:?} must start with '/' and name a prefix",
                self.base_path
            )));
        }
        if self.base_path.ends_with('/') {
            return Err(CacheError::InvalidConfig(format!(
                "base path {:?} must not end with '/'",
                self.base_path
            )));
        }
        if self.peer_timeout_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "peer timeout must be greater than zero".to_string(),
            ));
        }
        if self.replicas == 0 {
            return Err(CacheError::InvalidConfig(
                "replicas must be greater than zero".to_string(),
            ));
        }
        if self.namespace.is_empty() {
            return Err(CacheError::InvalidConfig(
                "namespace name is empty".to_string(),
            ));
        }
        reqwest::Url::parse(&self.self_addr).map_err(|e| {
            CacheError::InvalidConfig(format!("self address {:?}: {e}", self.self_addr))
        })?;
        for peer in &self.peers {
            reqwest::Url::parse(peer)
                .map_err(|e| CacheError::InvalidConfig(format!("peer address {peer:?}: {e}")))?;
            // Keys owned by the alias would be forwarded back to this node
            if is_self_alias(&self.self_addr, peer) {
                return Err(CacheError::InvalidConfig(format!(
                    "peer {peer} is this node under another name; list it as {}",
                    self.self_addr
                )));
            }
        }
        Ok(())
    }

    /// Upper bound on one fetch from a peer.
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    /// The coalesced wait timeout, `None` when disabled.
    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms))
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            self_addr: "http://127.0.0.1:3000".to_string(),
            peers: Vec::new(),
            cache_bytes: 64 << 20,
            replicas: 50,
            base_path: "/_peer_cache".to_string(),
            namespace: "default".to_string(),
            data_dir: PathBuf::from("./data"),
            load_timeout_ms: 0,
            peer_timeout_ms: 5000,
        }
    }
}
