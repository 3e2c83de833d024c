//! API Handlers
//!
//! HTTP request handlers for the peer endpoint and the diagnostics endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::group::Registry;
use crate::models::{HealthResponse, NamespaceStatsEntry, StatsResponse};

/// Default prefix of the peer endpoint.
pub const DEFAULT_BASE_PATH: &str = "/_peer_cache";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Namespaces served by this node
    pub registry: Arc<Registry>,
    /// Prefix of the peer endpoint, e.g. `/_peer_cache`
    pub base_path: String,
    /// This node's address on the ring
    pub self_addr: String,
}

impl AppState {
    /// Creates a new AppState serving `registry` under the default base path.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            base_path: DEFAULT_BASE_PATH.to_string(),
            self_addr: String::new(),
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &crate::config::Config, registry: Arc<Registry>) -> Self {
        Self {
            registry,
            base_path: config.base_path.clone(),
            self_addr: config.self_addr.clone(),
        }
    }
}

/// Handler for GET <base_path>/<namespace>/<key>
///
/// Serves the raw value bytes so that peers can fetch the keys this node
/// owns.
pub async fn peer_get_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response> {
    let (name, key) = path.split_once('/').ok_or_else(|| {
        CacheError::InvalidRequest(format!("expected <namespace>/<key>, got {path:?}"))
    })?;

    let namespace = state
        .registry
        .get_namespace(name)
        .ok_or_else(|| CacheError::NamespaceNotFound(name.to_string()))?;
    namespace.record_server_request();
    debug!(namespace = name, key, "serving peer request");

    // Requests from peers are never forwarded again
    let view = namespace.get_local(key).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        view.to_bytes(),
    )
        .into_response())
}

/// Handler for GET <base_path> and GET <base_path>/
///
/// Neither names a namespace nor a key.
pub async fn peer_root_handler(State(state): State<AppState>) -> CacheError {
    CacheError::InvalidRequest(format!(
        "expected {}/<namespace>/<key>",
        state.base_path
    ))
}

/// Handler for GET /stats
///
/// Returns per-namespace statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let namespaces = state
        .registry
        .stats()
        .into_iter()
        .map(|(name, stats)| NamespaceStatsEntry::new(name, stats))
        .collect();

    Json(StatsResponse::new(state.self_addr.clone(), namespaces))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    use crate::group::{Loader, LoaderFn, Namespace};

    fn scores_loader() -> impl Loader {
        LoaderFn::new(|key: String| async move {
            match key.as_str() {
                "Tom" => Ok(b"630".to_vec()),
                _ => Err(anyhow::anyhow!("{key} not exist")),
            }
        })
    }

    fn test_state() -> AppState {
        let registry = Arc::new(Registry::new());
        registry
            .create_namespace(Namespace::builder("scores").loader(scores_loader()))
            .unwrap();
        AppState::new(registry)
    }

    #[tokio::test]
    async fn test_peer_get_handler_returns_bytes() {
        let state = test_state();

        let response = peer_get_handler(State(state.clone()), Path("scores/Tom".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );

        let scores = state.registry.get_namespace("scores").unwrap();
        assert_eq!(scores.stats().server_requests, 1);
    }

    #[tokio::test]
    async fn test_peer_get_handler_malformed_path() {
        let result = peer_get_handler(State(test_state()), Path("scores".to_string())).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_peer_get_handler_unknown_namespace() {
        let result = peer_get_handler(State(test_state()), Path("nope/Tom".to_string())).await;
        assert!(matches!(result, Err(CacheError::NamespaceNotFound(_))));
    }

    #[tokio::test]
    async fn test_peer_get_handler_loader_error() {
        let result = peer_get_handler(State(test_state()), Path("scores/kkk".to_string())).await;
        match result {
            Err(err) => assert_eq!(err.to_string(), "kkk not exist"),
            Ok(_) => panic!("expected loader error"),
        }
    }

    #[tokio::test]
    async fn test_peer_root_handler_is_bad_request() {
        let err = peer_root_handler(State(test_state())).await;
        assert!(matches!(err, CacheError::InvalidRequest(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_peer_get_handler_does_not_forward() {
        use crate::peers::{PeerGetter, PeerPicker};

        struct NoPeer;

        impl PeerPicker for NoPeer {
            fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerGetter>> {
                panic!("peer requests must be answered locally");
            }
        }

        let state = test_state();
        state
            .registry
            .get_namespace("scores")
            .unwrap()
            .register_peers(Arc::new(NoPeer))
            .unwrap();

        let response = peer_get_handler(State(state), Path("scores/Tom".to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let response = stats_handler(State(test_state())).await;
        assert_eq!(response.namespaces.len(), 1);
        assert_eq!(response.namespaces[0].name, "scores");
        assert_eq!(response.namespaces[0].stats.gets, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
