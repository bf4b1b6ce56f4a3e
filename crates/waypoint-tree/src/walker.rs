//! Subtree Walker
//!
//! Depth-first traversal collecting decoded leaves under a root path. A
//! failing subtree is logged and skipped so one bad branch cannot hide the
//! healthy ones; the traversal context remembers how many branches failed and
//! the last error seen.

use crate::client::{Connector, TreeClient, TreeError};
use crate::codec::NodeCodec;
use crate::connection::ConnectionManager;
use crate::retry::{classify, retry_op, RetryPolicy};
use parking_lot::Mutex;
use tracing::{error, warn};

/// Per-lookup scratch state
#[derive(Debug)]
pub struct TraversalContext<N> {
    pub nodes: Vec<N>,
    pub failures: usize,
    pub last_error: Option<TreeError>,
    /// Most recent failure that was infrastructure trouble rather than an
    /// answer about the subtree
    pub last_transient: Option<TreeError>,
}

impl<N> TraversalContext<N> {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            failures: 0,
            last_error: None,
            last_transient: None,
        }
    }

    fn record_failure(&mut self, err: TreeError) {
        self.failures += 1;
        if err.is_transient() {
            self.last_transient = Some(err.clone());
        }
        self.last_error = Some(err);
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.failures = 0;
        self.last_error = None;
        self.last_transient = None;
    }
}

/// Recycles traversal contexts between lookups
#[derive(Debug)]
pub struct ContextPool<N> {
    free: Mutex<Vec<TraversalContext<N>>>,
    capacity: usize,
}

impl<N> ContextPool<N> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// A clean context, recycled when one is available.
    pub fn checkout(&self) -> TraversalContext<N> {
        self.free.lock().pop().unwrap_or_else(TraversalContext::new)
    }

    pub fn give_back(&self, mut ctx: TraversalContext<N>) {
        ctx.clear();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(ctx);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

pub(crate) fn join_path(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{child}")
    } else {
        format!("{parent}/{child}")
    }
}

pub(crate) struct Walker<'a, C: Connector, D: NodeCodec> {
    pub conn: &'a ConnectionManager<C>,
    pub codec: &'a D,
    pub policy: &'a RetryPolicy,
}

impl<'a, C: Connector, D: NodeCodec> Walker<'a, C, D> {
    /// Collects every decodable leaf under `root` into `ctx`, in depth-first
    /// order with children visited in the order the service lists them.
    pub async fn walk(&self, root: &str, ctx: &mut TraversalContext<D::Node>) {
        let mut stack = vec![root.to_string()];

        while let Some(path) = stack.pop() {
            let children = match self.children(&path).await {
                Ok(children) => children,
                Err(e) => {
                    error!(path = %path, error = %e, "Failed to list children, skipping subtree");
                    ctx.record_failure(e);
                    continue;
                }
            };

            if !children.is_empty() {
                for child in children.iter().rev() {
                    stack.push(join_path(&path, child));
                }
                continue;
            }

            match self.leaf(&path).await {
                Ok(node) => ctx.nodes.push(node),
                Err(e) => {
                    error!(path = %path, error = %e, "Failed to read leaf, skipping");
                    ctx.record_failure(e);
                }
            }
        }
    }

    async fn children(&self, path: &str) -> Result<Vec<String>, TreeError> {
        let conn = self.conn;
        retry_op(self.policy, "children", path, move || async move {
            let client = conn.conn().await.map_err(classify)?;
            match client.children(path).await {
                Ok(children) => Ok(children),
                Err(e) => Err(classify(Self::recover(conn, &client, e).await)),
            }
        })
        .await
    }

    async fn leaf(&self, path: &str) -> Result<D::Node, TreeError> {
        let conn = self.conn;
        let bytes = retry_op(self.policy, "data", path, move || async move {
            let client = conn.conn().await.map_err(classify)?;
            match client.data(path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) => Err(classify(Self::recover(conn, &client, e).await)),
            }
        })
        .await?;

        self.codec.decode(&bytes).map_err(|e| TreeError::Decode {
            path: path.to_string(),
            reason: format!("{e:#}"),
        })
    }

    /// Replaces the connection when `err` says the session is gone.
    async fn recover(
        conn: &ConnectionManager<C>,
        client: &std::sync::Arc<C::Client>,
        err: TreeError,
    ) -> TreeError {
        if err.needs_reconnect() {
            if let Err(reconnect_err) = conn.reconnect(client).await {
                warn!(error = %reconnect_err, "Reconnect after session loss failed");
            }
        }
        err
    }
}
