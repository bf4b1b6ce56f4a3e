//! Leaf decoding and endpoint construction
//!
//! A [`NodeCodec`] turns leaf payloads into nodes and a set of nodes into the
//! endpoint handed to the cache.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use waypoint_core::{Endpoint, Index};

pub trait NodeCodec: Send + Sync + 'static {
    type Node: Send + Sync + 'static;
    type Endpoint: Endpoint;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Node>;

    /// `None` when the nodes cannot form an endpoint.
    fn wrap(&self, index: &Index, nodes: &[Self::Node]) -> Option<Self::Endpoint>;
}

/// Address stored in a registry leaf
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub ip: String,
    pub port: u16,
}

impl Node {
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Decodes `{"ip": "...", "port": N}` leaves into round-robin endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonNodeCodec;

impl NodeCodec for JsonNodeCodec {
    type Node = Node;
    type Endpoint = RoundRobinEndpoint;

    fn decode(&self, bytes: &[u8]) -> Result<Node> {
        serde_json::from_slice(bytes).context("invalid node payload")
    }

    fn wrap(&self, index: &Index, nodes: &[Node]) -> Option<RoundRobinEndpoint> {
        if nodes.is_empty() {
            return None;
        }
        Some(RoundRobinEndpoint::new(index.clone(), nodes.to_vec()))
    }
}

#[derive(Debug)]
struct RoundRobinInner {
    index: Index,
    nodes: Vec<Node>,
    cursor: AtomicUsize,
}

/// Set of nodes for one service, handed out in rotation.
///
/// Clones share the rotation cursor.
#[derive(Debug, Clone)]
pub struct RoundRobinEndpoint {
    inner: Arc<RoundRobinInner>,
}

impl RoundRobinEndpoint {
    pub fn new(index: Index, nodes: Vec<Node>) -> Self {
        Self {
            inner: Arc::new(RoundRobinInner {
                index,
                nodes,
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.inner.nodes
    }

    /// Next node in rotation
    pub fn next(&self) -> Option<&Node> {
        let nodes = &self.inner.nodes;
        if nodes.is_empty() {
            return None;
        }
        let i = self.inner.cursor.fetch_add(1, Ordering::Relaxed) % nodes.len();
        nodes.get(i)
    }
}

impl PartialEq for RoundRobinEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.inner.index == other.inner.index && self.inner.nodes == other.inner.nodes
    }
}

impl Endpoint for RoundRobinEndpoint {
    fn index(&self) -> &Index {
        &self.inner.index
    }
}
