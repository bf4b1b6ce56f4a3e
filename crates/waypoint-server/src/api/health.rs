//! Health Check Endpoints
//!
//! Liveness and readiness probe handlers.

use super::state::AppState;
use axum::{extract::State, http::StatusCode};
use std::time::Duration;
use waypoint_tree::Connector;

/// Liveness probe endpoint. Verifies the registry connection is usable.
#[tracing::instrument(skip(state))]
pub async fn health_check<C: Connector>(
    State(state): State<AppState<C>>,
) -> Result<&'static str, StatusCode> {
    let check =
        tokio::time::timeout(Duration::from_secs(2), state.backend.connection().conn()).await;

    match check {
        Ok(Ok(_)) => Ok("OK"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Registry health check failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(_) => {
            tracing::warn!("Registry health check timed out");
            Err(StatusCode::REQUEST_TIMEOUT)
        }
    }
}

/// Readiness probe endpoint. Returns OK while the cache is serving.
#[tracing::instrument(skip(state))]
pub async fn readiness_check<C: Connector>(
    State(state): State<AppState<C>>,
) -> Result<&'static str, StatusCode> {
    if state.readiness.load(std::sync::atomic::Ordering::Acquire) {
        Ok("READY")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
