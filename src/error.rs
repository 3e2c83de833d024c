//! Error types for the peer cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the peer cache.
///
/// The enum is `Clone` so that a single load outcome can be handed to every
/// caller coalesced onto the same in-flight request.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// An empty key was passed to a namespace
    #[error("key is empty")]
    EmptyKey,

    /// Malformed request at the transport boundary
    #[error("bad request: {0}")]
    InvalidRequest(String),

    /// Namespace or server misconfiguration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Peers were registered twice for the same namespace
    #[error("peers already registered for namespace {0}")]
    PeersAlreadyRegistered(String),

    /// No namespace registered under this name
    #[error("no such namespace: {0}")]
    NamespaceNotFound(String),

    /// The loader failed; displayed exactly as the loader reported it
    #[error("{0}")]
    Loader(Arc<anyhow::Error>),

    /// Fetching from the owning peer failed
    #[error("peer {peer} failed: {message}")]
    Peer { peer: String, message: String },

    /// A coalesced waiter gave up on the in-flight load
    #[error("load of key {key} timed out after {after:?}")]
    Timeout { key: String, after: Duration },
}

impl CacheError {
    /// Wraps a loader failure without altering its message.
    pub fn loader(err: anyhow::Error) -> Self {
        CacheError::Loader(Arc::new(err))
    }

    /// HTTP status used when this error crosses the transport boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CacheError::EmptyKey
            | CacheError::InvalidRequest(_)
            | CacheError::InvalidConfig(_)
            | CacheError::PeersAlreadyRegistered(_) => StatusCode::BAD_REQUEST,
            CacheError::NamespaceNotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Loader(_) | CacheError::Peer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the peer cache.
pub type Result<T> = std::result::Result<T, CacheError>;
