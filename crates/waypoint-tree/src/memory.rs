//! In-memory Tree
//!
//! A hierarchical store implementing [`Connector`] / [`TreeClient`] without a
//! network, with hooks to inject failures and expire sessions. Used by tests
//! and local demos.

use crate::client::{ChildWatch, Connector, TreeClient, TreeError, WatchEventKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct Fault {
    remaining: usize,
    error: Option<TreeError>,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: BTreeMap<String, Vec<u8>>,
    watches: HashMap<String, Vec<oneshot::Sender<WatchEventKind>>>,
    data_faults: HashMap<String, Fault>,
    children_faults: HashMap<String, Fault>,
    data_calls: HashMap<String, usize>,
    children_calls: HashMap<String, usize>,
    offline: bool,
    /// Clients from an older session than this are dead
    session: u64,
    connects: usize,
    closed: usize,
    last_addrs: Vec<String>,
    /// Pause before a watch is armed
    arm_delay: Duration,
}

/// Shared handle to an in-memory tree
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    state: Arc<Mutex<TreeState>>,
}

fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

fn take_fault(faults: &mut HashMap<String, Fault>, path: &str) -> Option<TreeError> {
    let fault = faults.get_mut(path)?;
    if fault.remaining == 0 {
        return None;
    }
    fault.remaining -= 1;
    fault.error.clone()
}

impl TreeState {
    fn fire(&mut self, path: &str, kind: WatchEventKind) {
        if let Some(senders) = self.watches.remove(path) {
            for tx in senders {
                let _ = tx.send(kind);
            }
        }
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { tree: self.clone() }
    }

    /// Creates or overwrites `path`, creating missing ancestors with empty data.
    pub fn put(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.state.lock();

        let mut missing = Vec::new();
        let mut cursor = parent_of(path);
        while let Some(ancestor) = cursor {
            if ancestor == "/" || state.nodes.contains_key(ancestor) {
                break;
            }
            missing.push(ancestor.to_string());
            cursor = parent_of(ancestor);
        }
        for ancestor in missing.into_iter().rev() {
            state.nodes.insert(ancestor.clone(), Vec::new());
            if let Some(parent) = parent_of(&ancestor) {
                let parent = parent.to_string();
                state.fire(&parent, WatchEventKind::ChildrenChanged);
            }
        }

        let created = state.nodes.insert(path.to_string(), data.into()).is_none();
        if created {
            if let Some(parent) = parent_of(path) {
                let parent = parent.to_string();
                state.fire(&parent, WatchEventKind::ChildrenChanged);
            }
        }
    }

    /// Stores the JSON form of a node.
    pub fn put_node(&self, path: &str, ip: &str, port: u16) {
        let payload = serde_json::json!({ "ip": ip, "port": port }).to_string();
        self.put(path, payload);
    }

    /// Removes `path` and everything beneath it.
    pub fn delete(&self, path: &str) {
        let mut state = self.state.lock();
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let doomed: Vec<String> = state
            .nodes
            .keys()
            .filter(|k| k.as_str() == path || k.starts_with(&prefix))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return;
        }
        for key in &doomed {
            state.nodes.remove(key);
        }
        if let Some(parent) = parent_of(path) {
            let parent = parent.to_string();
            state.fire(&parent, WatchEventKind::ChildrenChanged);
        }
    }

    /// The next `times` reads of `path` fail with `error`.
    pub fn fail_data(&self, path: &str, times: usize, error: TreeError) {
        self.state.lock().data_faults.insert(
            path.to_string(),
            Fault {
                remaining: times,
                error: Some(error),
            },
        );
    }

    /// The next `times` listings of `path` fail with `error`.
    pub fn fail_children(&self, path: &str, times: usize, error: TreeError) {
        self.state.lock().children_faults.insert(
            path.to_string(),
            Fault {
                remaining: times,
                error: Some(error),
            },
        );
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.data_faults.clear();
        state.children_faults.clear();
    }

    /// Refuse new connections with `NoServer`.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Every `watch_children` call waits this long before touching the tree.
    pub fn set_arm_delay(&self, delay: Duration) {
        self.state.lock().arm_delay = delay;
    }

    /// Kills every open session and drops its armed watches.
    pub fn expire_sessions(&self) {
        let mut state = self.state.lock();
        state.session += 1;
        state.watches.clear();
    }

    pub fn data_calls(&self, path: &str) -> usize {
        self.state.lock().data_calls.get(path).copied().unwrap_or(0)
    }

    pub fn children_calls(&self, path: &str) -> usize {
        self.state.lock().children_calls.get(path).copied().unwrap_or(0)
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn closed_clients(&self) -> usize {
        self.state.lock().closed
    }

    pub fn last_addrs(&self) -> Vec<String> {
        self.state.lock().last_addrs.clone()
    }

    /// Number of armed child watches on `path`
    pub fn armed_watches(&self, path: &str) -> usize {
        self.state
            .lock()
            .watches
            .get(path)
            .map(|w| w.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    tree: MemoryTree,
}

#[async_trait]
impl Connector for MemoryConnector {
    type Client = MemoryClient;

    async fn connect(
        &self,
        addrs: &[String],
        _session_timeout: Duration,
    ) -> Result<MemoryClient, TreeError> {
        let mut state = self.tree.state.lock();
        if state.offline {
            return Err(TreeError::NoServer);
        }
        state.connects += 1;
        state.last_addrs = addrs.to_vec();
        Ok(MemoryClient {
            tree: self.tree.clone(),
            session: state.session,
        })
    }
}

#[derive(Debug)]
pub struct MemoryClient {
    tree: MemoryTree,
    session: u64,
}

impl MemoryClient {
    fn check_session(&self, state: &TreeState) -> Result<(), TreeError> {
        if state.session != self.session {
            return Err(TreeError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl TreeClient for MemoryClient {
    async fn children(&self, path: &str) -> Result<Vec<String>, TreeError> {
        let mut state = self.tree.state.lock();
        *state.children_calls.entry(path.to_string()).or_default() += 1;
        self.check_session(&state)?;
        if let Some(err) = take_fault(&mut state.children_faults, path) {
            return Err(err);
        }
        if path != "/" && !state.nodes.contains_key(path) {
            return Err(TreeError::NoNode(path.to_string()));
        }

        let children = state
            .nodes
            .keys()
            .filter(|k| parent_of(k) == Some(path))
            .filter_map(|k| k.rsplit('/').next())
            .map(String::from)
            .collect();
        Ok(children)
    }

    async fn data(&self, path: &str) -> Result<Vec<u8>, TreeError> {
        let mut state = self.tree.state.lock();
        *state.data_calls.entry(path.to_string()).or_default() += 1;
        self.check_session(&state)?;
        if let Some(err) = take_fault(&mut state.data_faults, path) {
            return Err(err);
        }
        state
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| TreeError::NoNode(path.to_string()))
    }

    async fn watch_children(&self, path: &str) -> Result<ChildWatch, TreeError> {
        let delay = self.tree.state.lock().arm_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.tree.state.lock();
        self.check_session(&state)?;
        if path != "/" && !state.nodes.contains_key(path) {
            return Err(TreeError::NoNode(path.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        state.watches.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn close(&self) {
        self.tree.state.lock().closed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn client(tree: &MemoryTree) -> MemoryClient {
        tree.connector()
            .connect(&["mem://".to_string()], Duration::from_secs(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_creates_ancestors() {
        let tree = MemoryTree::new();
        tree.put("/svc/a/leaf", "x");
        let client = client(&tree).await;

        assert_eq!(client.children("/").await.unwrap(), vec!["svc"]);
        assert_eq!(client.children("/svc").await.unwrap(), vec!["a"]);
        assert_eq!(client.children("/svc/a/leaf").await.unwrap(), Vec::<String>::new());
        assert_eq!(client.data("/svc/a/leaf").await.unwrap(), b"x".to_vec());
    }

    #[tokio::test]
    async fn test_watch_fires_once_on_new_child() {
        let tree = MemoryTree::new();
        tree.put("/svc/a", "x");
        let client = client(&tree).await;

        let watch = client.watch_children("/svc").await.unwrap();
        tree.put("/svc/b", "y");
        assert_eq!(watch.await, Ok(WatchEventKind::ChildrenChanged));

        // Data updates of existing children do not fire child watches
        let watch = client.watch_children("/svc").await.unwrap();
        tree.put("/svc/a", "z");
        assert_eq!(tree.armed_watches("/svc"), 1);
        drop(watch);
    }

    #[tokio::test]
    async fn test_expired_session_rejects_calls() {
        let tree = MemoryTree::new();
        tree.put("/svc/a", "x");
        let client = client(&tree).await;
        let watch = client.watch_children("/svc").await.unwrap();

        tree.expire_sessions();

        assert_eq!(client.data("/svc/a").await, Err(TreeError::ConnectionClosed));
        assert!(watch.await.is_err());
    }

    #[tokio::test]
    async fn test_delete_subtree() {
        let tree = MemoryTree::new();
        tree.put("/svc/a/1", "x");
        tree.put("/svc/b", "y");
        tree.delete("/svc/a");
        let client = client(&tree).await;

        assert_eq!(client.children("/svc").await.unwrap(), vec!["b"]);
        assert_eq!(
            client.data("/svc/a/1").await,
            Err(TreeError::NoNode("/svc/a/1".into()))
        );
    }
}
