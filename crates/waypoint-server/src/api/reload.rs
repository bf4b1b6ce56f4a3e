//! Reload Endpoint
//!
//! POST /reload swaps the key to path namespace and, optionally, the registry
//! addresses without restarting the process.

use super::resolve::ErrorResponse;
use super::AppState;
use crate::cli::validate_entry;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use waypoint_tree::{Connector, PathMap};

/// Request body for POST /reload
#[derive(Debug, Deserialize)]
pub struct ReloadRequest {
    pub namespace: PathMap,
    /// Keeps the current addresses when absent
    #[serde(default)]
    pub endpoints: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub keys: usize,
    pub endpoints: Vec<String>,
}

/// POST /reload - Replace namespace and registry addresses
#[tracing::instrument(skip(state, request))]
pub async fn reload<C: Connector>(
    State(state): State<AppState<C>>,
    Json(request): Json<ReloadRequest>,
) -> Response {
    for (key, path) in &request.namespace {
        if let Err(reason) = validate_entry(key, path) {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: reason })).into_response();
        }
    }

    let endpoints = match request.endpoints {
        Some(endpoints) if endpoints.is_empty() => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "endpoints must not be empty".to_string(),
                }),
            )
                .into_response();
        }
        Some(endpoints) => endpoints,
        None => state.backend.connection().addrs(),
    };

    let keys = request.namespace.len();
    state.backend.reload(request.namespace, endpoints.clone());
    tracing::info!(keys = keys, endpoints = ?endpoints, "Namespace reloaded");

    (StatusCode::OK, Json(ReloadResponse { keys, endpoints })).into_response()
}
