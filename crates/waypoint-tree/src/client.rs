//! Coordination Service Client Interface
//!
//! The tree backend never speaks a wire protocol itself. It drives a
//! hierarchical namespace through [`TreeClient`] and obtains clients from a
//! [`Connector`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("client is closing")]
    Closing,
    #[error("session moved to another server")]
    SessionMoved,
    #[error("no server responded")]
    NoServer,
    #[error("unknown coordination service error")]
    Unknown,
    #[error("node {0} does not exist")]
    NoNode(String),
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("no leaf nodes under {0}")]
    Empty(String),
    #[error("endpoint wrap refused for {0}")]
    Wrap(String),
    #[error("{0}")]
    Other(String),
}

impl TreeError {
    /// The session behind the client is gone; a fresh connection is needed.
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            TreeError::ConnectionClosed | TreeError::Closing | TreeError::SessionMoved
        )
    }

    /// Infrastructure trouble rather than an answer about the key.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TreeError::ConnectionClosed
                | TreeError::Closing
                | TreeError::SessionMoved
                | TreeError::Unknown
                | TreeError::NoServer
        )
    }

    /// Retrying cannot change the outcome.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TreeError::NoNode(_) | TreeError::Decode { .. })
    }
}

/// Notification delivered once by an armed watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    ChildrenChanged,
    NodeCreated,
    NodeDeleted,
    DataChanged,
}

/// One-shot watch. Resolves to an error when the session dropped the watch.
pub type ChildWatch = oneshot::Receiver<WatchEventKind>;

#[async_trait]
pub trait TreeClient: Send + Sync + 'static {
    /// Names (not full paths) of the direct children of `path`.
    async fn children(&self, path: &str) -> Result<Vec<String>, TreeError>;

    /// Payload stored at `path`.
    async fn data(&self, path: &str) -> Result<Vec<u8>, TreeError>;

    /// Arm a one-shot watch on the children of `path`.
    async fn watch_children(&self, path: &str) -> Result<ChildWatch, TreeError>;

    /// Release the session.
    async fn close(&self);
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: TreeClient;

    async fn connect(
        &self,
        addrs: &[String],
        session_timeout: Duration,
    ) -> Result<Self::Client, TreeError>;
}
