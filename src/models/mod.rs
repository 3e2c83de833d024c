//! Response models for the peer cache API
//!
//! This module defines the DTOs (Data Transfer Objects) serialized into
//! the JSON bodies of the stats, health and error responses.

pub mod responses;

// Re-export commonly used types
pub use responses::{ErrorResponse, HealthResponse, NamespaceStatsEntry, StatsResponse};
