use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use waypoint_core::CacheConfig;
use waypoint_server::api::{self, AppState, ReloadRequest};
use waypoint_server::app::build_state;
use waypoint_tree::{MemoryConnector, MemoryTree, TreeConfig};

fn paths(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn state(tree: &MemoryTree, pairs: &[(&str, &str)]) -> AppState<MemoryConnector> {
    let tree_config = TreeConfig {
        endpoints: vec!["mem://primary".to_string()],
        ..TreeConfig::default()
    };
    build_state(
        tree.connector(),
        paths(pairs),
        CacheConfig::default(),
        &tree_config,
        None,
    )
    .await
    .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn resolve(state: &AppState<MemoryConnector>, key: &str) -> Response {
    api::resolve(State(state.clone()), Path(key.to_string())).await
}

#[tokio::test(start_paused = true)]
async fn test_resolve_known_key() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 8001);
    tree.put_node("/svc/b", "10.0.0.2", 8002);
    let state = state(&tree, &[("svc", "/svc")]).await;

    let response = resolve(&state, "svc").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["key"], "svc");
    assert_eq!(body["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(body["nodes"][0]["ip"], "10.0.0.1");
    assert_eq!(body["selected"], "10.0.0.1:8001");

    // Round-robin moves on with the next request
    let body = body_json(resolve(&state, "svc").await).await;
    assert_eq!(body["selected"], "10.0.0.2:8002");
}

#[tokio::test(start_paused = true)]
async fn test_resolve_unknown_key_is_not_found() {
    let tree = MemoryTree::new();
    let state = state(&tree, &[]).await;

    let response = resolve(&state, "ghost").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test(start_paused = true)]
async fn test_resolve_during_outage_is_unavailable() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 8001);
    tree.put_node("/late/a", "10.0.0.9", 9001);
    let state = state(&tree, &[("svc", "/svc")]).await;

    tree.set_offline(true);
    tree.expire_sessions();

    // Cached keys keep answering
    assert_eq!(resolve(&state, "svc").await.status(), StatusCode::OK);

    // A cold key cannot be told apart from a missing one, so it is not cached as missing
    state
        .backend
        .namespace()
        .reload(paths(&[("svc", "/svc"), ("late", "/late")]));
    assert_eq!(
        resolve(&state, "late").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test(start_paused = true)]
async fn test_probes() {
    let tree = MemoryTree::new();
    let state = state(&tree, &[]).await;

    assert_eq!(api::health_check(State(state.clone())).await, Ok("OK"));
    assert_eq!(api::readiness_check(State(state.clone())).await, Ok("READY"));

    state.readiness.store(false, Ordering::Release);
    assert_eq!(
        api::readiness_check(State(state.clone())).await,
        Err(StatusCode::SERVICE_UNAVAILABLE)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cache_listing() {
    let tree = MemoryTree::new();
    tree.put_node("/b/1", "10.0.0.2", 2);
    tree.put_node("/a/1", "10.0.0.1", 1);
    let state = state(&tree, &[("a", "/a"), ("b", "/b")]).await;
    resolve(&state, "missing").await;

    let Json(listing) = api::get_cache(State(state.clone())).await;

    assert_eq!(listing.ttl_secs, 30);
    let keys: Vec<&str> = listing.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "missing"]);
    assert_eq!(listing.entries[0].result, "Hit");
    assert_eq!(listing.entries[2].result, "Miss");
}

#[tokio::test(start_paused = true)]
async fn test_reload_namespace() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    tree.put_node("/other/a", "10.0.0.5", 5);
    let state = state(&tree, &[("svc", "/svc")]).await;

    let response = api::reload(
        State(state.clone()),
        Json(ReloadRequest {
            namespace: paths(&[("other", "/other")]),
            endpoints: None,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["keys"], 1);
    assert_eq!(body["endpoints"][0], "mem://primary");

    assert_eq!(resolve(&state, "other").await.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_reload_rejects_relative_paths() {
    let tree = MemoryTree::new();
    let state = state(&tree, &[]).await;

    let response = api::reload(
        State(state.clone()),
        Json(ReloadRequest {
            namespace: paths(&[("svc", "svc")]),
            endpoints: None,
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.backend.namespace().is_empty());
}
