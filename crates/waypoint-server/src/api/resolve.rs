//! Resolve Endpoint
//!
//! GET /resolve/{key} answers from the discovery cache.

use super::AppState;
use crate::observability::metrics::record_resolve;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use waypoint_core::{DiscoveryError, Index};
use waypoint_tree::{Connector, Node};

/// Response for a resolved key
#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub key: String,
    pub nodes: Vec<Node>,
    /// Node picked by round-robin for this request
    pub selected: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn status_for(err: &DiscoveryError) -> StatusCode {
    match err {
        DiscoveryError::NotFound(_) => StatusCode::NOT_FOUND,
        DiscoveryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /resolve/{key} - Resolve a service key to its nodes
#[tracing::instrument(skip(state))]
pub async fn resolve<C: Connector>(
    State(state): State<AppState<C>>,
    Path(key): Path<String>,
) -> Response {
    let started = Instant::now();
    let index = Index::from(key);

    let (status, response) = match state.cache.get(&index).await {
        Ok(endpoint) => (
            StatusCode::OK,
            Json(ResolveResponse {
                key: index.to_string(),
                nodes: endpoint.nodes().to_vec(),
                selected: endpoint.next().map(Node::address),
            })
            .into_response(),
        ),
        Err(e) => {
            let status = status_for(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(key = %index, error = %e, "Resolve failed");
            } else {
                tracing::debug!(key = %index, error = %e, "Resolve returned no endpoint");
            }
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                })
                .into_response(),
            )
        }
    };

    record_resolve(status.as_u16(), started.elapsed());
    (status, response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let index = Index::from("svc");
        assert_eq!(
            status_for(&DiscoveryError::NotFound(index.clone())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&DiscoveryError::Unavailable(index.clone())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&DiscoveryError::Assertion(index)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
