//! Peer Cache - A distributed, read-through, in-memory cache node
//!
//! Serves one namespace backed by a directory of files and shares the key
//! space with the configured peers.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peer_cache::{create_router, AppState, Config, DirectoryLoader, HttpPool, Namespace, Registry};

/// Main entry point for a peer cache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Create the namespace with its directory loader
/// 4. Place the configured peers on the hash ring
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peer_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Peer Cache node");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: self={}, peers={:?}, namespace={}, cache_bytes={}, port={}",
        config.self_addr, config.peers, config.namespace, config.cache_bytes, config.server_port
    );

    // Every node places itself on the ring so it owns a share of the keys
    let pool = Arc::new(HttpPool::with_request_timeout(
        &config.self_addr,
        &config.base_path,
        config.replicas,
        config.peer_timeout(),
    )?);
    let mut members = config.peers.clone();
    if !members.iter().any(|p| p.trim_end_matches('/') == pool.self_addr()) {
        members.push(config.self_addr.clone());
    }
    pool.set_peers(&members)?;

    let mut builder = Namespace::builder(config.namespace.clone())
        .cache_bytes(config.cache_bytes)
        .loader(DirectoryLoader::new(config.data_dir.clone()))
        .peers(pool);
    if let Some(timeout) = config.load_timeout() {
        builder = builder.load_timeout(timeout);
    }

    let registry = Arc::new(Registry::new());
    registry.create_namespace(builder)?;
    info!(
        "Namespace {} serving files from {}",
        config.namespace,
        config.data_dir.display()
    );

    let app = create_router(AppState::from_config(&config, registry));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
