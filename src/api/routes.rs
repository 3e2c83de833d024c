//! API Routes
//!
//! Configures the Axum router with the peer and diagnostics endpoints.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, peer_get_handler, peer_root_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET <base_path>/<namespace>/<key>` - Raw value bytes for peers
/// - `GET /stats` - Per-namespace statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let base_path = state.base_path.trim_end_matches('/');
    let peer_route = format!("{base_path}/*path");

    Router::new()
        .route(&peer_route, get(peer_get_handler))
        // The wildcard needs at least one character
        .route(base_path, get(peer_root_handler))
        .route(&format!("{base_path}/"), get(peer_root_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
