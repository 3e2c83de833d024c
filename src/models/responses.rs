//! Response DTOs for the peer cache API
//!
//! Defines the structure of outgoing JSON response bodies.

use serde::Serialize;

use crate::group::NamespaceStats;

/// Stats of one namespace, as listed by GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStatsEntry {
    /// Namespace name
    pub name: String,
    /// Cache hit rate over all gets (hits / gets)
    pub hit_rate: f64,
    #[serde(flatten)]
    pub stats: NamespaceStats,
}

impl NamespaceStatsEntry {
    /// Creates an entry, deriving the hit rate from the counters
    pub fn new(name: impl Into<String>, stats: NamespaceStats) -> Self {
        let hit_rate = if stats.gets > 0 {
            stats.cache_hits as f64 / stats.gets as f64
        } else {
            0.0
        };
        Self {
            name: name.into(),
            hit_rate,
            stats,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// This node's address on the ring
    pub self_addr: String,
    /// Every registered namespace, sorted by name
    pub namespaces: Vec<NamespaceStatsEntry>,
}

impl StatsResponse {
    /// Creates a new StatsResponse
    pub fn new(self_addr: impl Into<String>, namespaces: Vec<NamespaceStatsEntry>) -> Self {
        Self {
            self_addr: self_addr.into(),
            namespaces,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
