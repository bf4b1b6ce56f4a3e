use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use waypoint_core::{DiscoveryCache, Endpoint, Event, Index, Resolution, Source};
use waypoint_tree::{
    JsonNodeCodec, MemoryConnector, MemoryTree, RoundRobinEndpoint, TreeBackend, TreeConfig,
    TreeError,
};

type Backend = TreeBackend<MemoryConnector, JsonNodeCodec>;

fn config() -> TreeConfig {
    TreeConfig {
        endpoints: vec!["mem://primary".to_string()],
        ..TreeConfig::default()
    }
}

fn paths(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn backend(tree: &MemoryTree, pairs: &[(&str, &str)]) -> Backend {
    TreeBackend::new(tree.connector(), JsonNodeCodec, paths(pairs), &config())
}

fn ports(endpoint: &RoundRobinEndpoint) -> Vec<u16> {
    endpoint.nodes().iter().map(|n| n.port).collect()
}

async fn found(backend: &Backend, key: &str) -> RoundRobinEndpoint {
    match backend.get(&Index::from(key)).await {
        Resolution::Found(endpoint) => endpoint,
        other => panic!("expected {key} to resolve, got {other:?}"),
    }
}

/// Lets spawned watch tasks arm their watches
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_collects_every_leaf() {
    let tree = MemoryTree::new();
    tree.put_node("/services/svc/a", "10.0.0.1", 8001);
    tree.put_node("/services/svc/b", "10.0.0.2", 8002);
    tree.put_node("/services/svc/zone/c", "10.0.0.3", 8003);
    let backend = backend(&tree, &[("svc", "/services/svc")]);

    let endpoint = found(&backend, "svc").await;

    assert_eq!(endpoint.index().as_str(), "svc");
    assert_eq!(ports(&endpoint), vec![8001, 8002, 8003]);
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_still_resolves() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    tree.put_node("/svc/b", "10.0.0.2", 2);
    tree.put_node("/svc/c", "10.0.0.3", 3);
    tree.fail_data("/svc/b", usize::MAX, TreeError::Unknown);
    tree.fail_data("/svc/c", usize::MAX, TreeError::Other("corrupt".into()));
    let backend = backend(&tree, &[("svc", "/svc")]);

    let endpoint = found(&backend, "svc").await;

    assert_eq!(ports(&endpoint), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_everywhere_is_unavailable() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    tree.put_node("/svc/b", "10.0.0.2", 2);
    tree.fail_data("/svc/a", usize::MAX, TreeError::SessionMoved);
    tree.fail_data("/svc/b", usize::MAX, TreeError::Unknown);
    let backend = backend(&tree, &[("svc", "/svc")]);

    assert_eq!(
        backend.get(&Index::from("svc")).await,
        Resolution::Unavailable
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_beside_undecodable_leaf_is_unavailable() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    tree.put("/svc/b", "{");
    tree.fail_data("/svc/a", usize::MAX, TreeError::ConnectionClosed);
    let backend = backend(&tree, &[("svc", "/svc")]);

    assert_eq!(
        backend.get(&Index::from("svc")).await,
        Resolution::Unavailable
    );
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_registry_is_unavailable() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    tree.set_offline(true);
    let backend = backend(&tree, &[("svc", "/svc")]);

    assert_eq!(
        backend.get(&Index::from("svc")).await,
        Resolution::Unavailable
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_root_is_absent() {
    let tree = MemoryTree::new();
    let backend = backend(&tree, &[("svc", "/svc")]);

    assert_eq!(backend.get(&Index::from("svc")).await, Resolution::Absent);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_key_is_absent_without_registry_calls() {
    let tree = MemoryTree::new();
    let backend = backend(&tree, &[("svc", "/svc")]);

    assert_eq!(backend.get(&Index::from("nope")).await, Resolution::Absent);
    assert_eq!(tree.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_leaves_only_is_absent() {
    let tree = MemoryTree::new();
    tree.put("/svc/a", "garbage");
    let backend = backend(&tree, &[("svc", "/svc")]);

    assert_eq!(backend.get(&Index::from("svc")).await, Resolution::Absent);
}

#[tokio::test(start_paused = true)]
async fn test_session_loss_mid_lookup_reconnects() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    let backend = backend(&tree, &[("svc", "/svc")]);
    found(&backend, "svc").await;

    tree.expire_sessions();
    let endpoint = found(&backend, "svc").await;

    assert_eq!(ports(&endpoint), vec![1]);
    assert_eq!(tree.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_all_skips_broken_keys() {
    let tree = MemoryTree::new();
    tree.put_node("/a/1", "10.0.0.1", 1);
    tree.put_node("/c/1", "10.0.0.3", 3);
    let backend = backend(&tree, &[("a", "/a"), ("b", "/b"), ("c", "/c")]);

    let snapshot = backend.fetch_all().await.unwrap();

    let keys: Vec<&str> = snapshot.iter().map(|e| e.index().as_str()).collect();
    assert_eq!(keys, vec!["a", "c"]);
}

#[tokio::test(start_paused = true)]
async fn test_init_fails_when_registry_unreachable() {
    let tree = MemoryTree::new();
    tree.set_offline(true);
    let backend = backend(&tree, &[("svc", "/svc")]);

    assert!(backend.init().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_watch_reports_new_children() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    let backend = backend(&tree, &[("svc", "/svc")]);
    backend.init().await.unwrap();
    let mut events = backend.watch();
    settle().await;

    tree.put_node("/svc/b", "10.0.0.2", 2);
    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap();
    assert_eq!(event, Some(Event::children_changed("svc")));

    // The watch is re-armed after firing
    settle().await;
    tree.delete("/svc/a");
    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap();
    assert_eq!(event, Some(Event::children_changed("svc")));
}

#[tokio::test(start_paused = true)]
async fn test_data_change_is_not_reported() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    let backend = backend(&tree, &[("svc", "/svc")]);
    backend.init().await.unwrap();
    let mut events = backend.watch();
    settle().await;

    tree.put_node("/svc/a", "10.0.0.9", 1);

    let event = tokio::time::timeout(Duration::from_secs(1), events.next()).await;
    assert!(event.is_err(), "unexpected event {event:?}");
}

#[tokio::test(start_paused = true)]
async fn test_watch_survives_session_expiry() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    let backend = backend(&tree, &[("svc", "/svc")]);
    backend.init().await.unwrap();
    let mut events = backend.watch();
    settle().await;

    tree.expire_sessions();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(tree.armed_watches("/svc"), 1);

    tree.put_node("/svc/b", "10.0.0.2", 2);
    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap();
    assert_eq!(event, Some(Event::children_changed("svc")));
    assert_eq!(tree.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reload_swaps_namespace_and_addresses() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    tree.put_node("/other/a", "10.0.0.5", 5);
    let backend = backend(&tree, &[("svc", "/svc")]);
    backend.init().await.unwrap();
    let mut events = backend.watch();
    settle().await;

    backend.reload(paths(&[("other", "/other")]), vec!["mem://standby".into()]);
    settle().await;

    assert_eq!(backend.get(&Index::from("svc")).await, Resolution::Absent);
    assert_eq!(ports(&found(&backend, "other").await), vec![5]);
    assert_eq!(tree.last_addrs(), vec!["mem://standby".to_string()]);

    // Only the new key's path is watched
    tree.put_node("/svc/b", "10.0.0.2", 2);
    tree.put_node("/other/b", "10.0.0.6", 6);
    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .unwrap();
    assert_eq!(event, Some(Event::children_changed("other")));
}

#[tokio::test(start_paused = true)]
async fn test_cache_follows_registry_changes() {
    let tree = MemoryTree::new();
    tree.put_node("/svc/a", "10.0.0.1", 1);
    let backend = Arc::new(backend(&tree, &[("svc", "/svc")]));
    let cache = DiscoveryCache::new(Arc::clone(&backend), Duration::from_secs(10))
        .await
        .unwrap();
    let index = Index::from("svc");

    assert_eq!(ports(&cache.get(&index).await.unwrap()), vec![1]);

    settle().await;
    tree.put_node("/svc/b", "10.0.0.2", 2);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(ports(&cache.get(&index).await.unwrap()), vec![1, 2]);

    // Registry outage: the last known value keeps being served
    tree.set_offline(true);
    tree.expire_sessions();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(ports(&cache.get(&index).await.unwrap()), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_cache_negative_caches_unmapped_keys() {
    let tree = MemoryTree::new();
    let backend = backend(&tree, &[]);
    let cache = DiscoveryCache::new(backend, Duration::from_secs(10))
        .await
        .unwrap();

    let err = cache.get(&Index::from("ghost")).await.unwrap_err();
    assert!(err.is_not_found());
}
