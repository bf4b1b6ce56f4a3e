//! HTTP API Module
//!
//! - `state`: shared application state
//! - `health`: liveness and readiness probes
//! - `resolve`: key resolution through the discovery cache
//! - `cache`: cache table diagnostics
//! - `reload`: namespace and registry address reload
//! - `metrics`: Prometheus metrics endpoint

mod cache;
mod health;
mod metrics;
mod reload;
mod resolve;
mod state;

pub use cache::{get_cache, CacheResponse, EntryInfo};
pub use health::{health_check, readiness_check};
pub use reload::{reload, ReloadRequest, ReloadResponse};
pub use resolve::{resolve, ErrorResponse, ResolveResponse};
pub use state::{AppState, Backend};

use axum::{
    routing::{get, post},
    Router,
};
use waypoint_tree::Connector;

/// Create the API router with all endpoints
pub fn create_router<C: Connector>(state: AppState<C>) -> Router {
    Router::new()
        // Health checks
        .route("/health", get(health_check::<C>))
        .route("/ready", get(readiness_check::<C>))
        // Observability
        .route("/metrics", get(metrics::get_metrics::<C>))
        // Discovery
        .route("/resolve/{key}", get(resolve::<C>))
        .route("/cache", get(get_cache::<C>))
        .route("/reload", post(reload::<C>))
        .with_state(state)
}
