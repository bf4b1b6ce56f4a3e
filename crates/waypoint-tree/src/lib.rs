//! Waypoint Tree
//!
//! Registry backend for hierarchical coordination services. Service nodes are
//! leaves under a per-key root path; a key's endpoint is built from every leaf
//! that can be read. Ships an etcd-backed client and an in-memory tree.

pub mod backend;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod etcd;
pub mod memory;
pub mod namespace;
pub mod retry;
mod walker;
mod watch;

pub use backend::TreeBackend;
pub use client::{ChildWatch, Connector, TreeClient, TreeError, WatchEventKind};
pub use codec::{JsonNodeCodec, Node, NodeCodec, RoundRobinEndpoint};
pub use config::TreeConfig;
pub use connection::ConnectionManager;
pub use etcd::{EtcdConnector, EtcdTreeClient};
pub use memory::{MemoryConnector, MemoryTree};
pub use namespace::{Namespace, PathMap};
pub use retry::{LinearBackoff, RetryPolicy};
pub use walker::{ContextPool, TraversalContext};
