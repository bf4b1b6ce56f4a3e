//! Application Wiring
//!
//! Builds the backend and cache, then serves the API until a shutdown signal.

use crate::api::{self, AppState};
use crate::observability::MetricsState;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use waypoint_core::{CacheConfig, DiscoveryCache};
use waypoint_tree::{Connector, JsonNodeCodec, PathMap, TreeBackend, TreeConfig};

/// Connect the backend through `connector` and warm up the cache.
pub async fn build_state<C: Connector>(
    connector: C,
    namespace: PathMap,
    cache_config: CacheConfig,
    tree_config: &TreeConfig,
    metrics_state: Option<MetricsState>,
) -> anyhow::Result<AppState<C>> {
    info!(
        keys = namespace.len(),
        endpoints = ?tree_config.endpoints,
        "Starting discovery cache"
    );

    let backend = Arc::new(TreeBackend::new(
        connector,
        JsonNodeCodec,
        namespace,
        tree_config,
    ));
    let cache = DiscoveryCache::with_config(Arc::clone(&backend), cache_config)
        .await
        .context("Failed to initialize discovery cache")?;

    info!(
        entries = cache.len(),
        ttl_secs = cache.effective_ttl().as_secs(),
        "Discovery cache ready"
    );

    Ok(AppState {
        cache: Arc::new(cache),
        backend,
        metrics_state,
        readiness: Arc::new(AtomicBool::new(true)),
    })
}

/// Serve the API on `bind_addr` until Ctrl-C.
pub async fn serve<C: Connector>(state: AppState<C>, bind_addr: SocketAddr) -> anyhow::Result<()> {
    let readiness = Arc::clone(&state.readiness);
    let app = api::create_router(state);

    info!(addr = %bind_addr, "Starting API server");
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(readiness))
        .await
        .context("API server failed")?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal(readiness: Arc<AtomicBool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("Shutdown signal received, draining");
}
