//! Cache Diagnostics Endpoint
//!
//! Exposes the cache table at GET /cache

use super::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use waypoint_tree::Connector;

/// Response for GET /cache
#[derive(Debug, Serialize)]
pub struct CacheResponse {
    pub ttl_secs: u64,
    pub entries: Vec<EntryInfo>,
}

/// Status of a single cache entry
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub result: String,
    pub refresh: String,
    pub expires_in_ms: u64,
}

/// GET /cache - List every cache entry with its state
#[tracing::instrument(skip(state))]
pub async fn get_cache<C: Connector>(State(state): State<AppState<C>>) -> Json<CacheResponse> {
    let mut entries: Vec<EntryInfo> = state
        .cache
        .snapshot()
        .into_iter()
        .map(|(index, status)| EntryInfo {
            key: index.to_string(),
            result: format!("{:?}", status.result),
            refresh: format!("{:?}", status.refresh),
            expires_in_ms: status.expires_in.as_millis() as u64,
        })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    Json(CacheResponse {
        ttl_secs: state.cache.effective_ttl().as_secs(),
        entries,
    })
}
