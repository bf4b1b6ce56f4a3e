//! Tree Backend
//!
//! [`Source`] implementation over a hierarchical registry. A key maps to a
//! root path through the namespace; every leaf under that root is one node of
//! the key's endpoint.

use crate::client::{Connector, TreeError};
use crate::codec::NodeCodec;
use crate::config::TreeConfig;
use crate::connection::ConnectionManager;
use crate::namespace::{Namespace, PathMap};
use crate::retry::RetryPolicy;
use crate::walker::{ContextPool, Walker};
use crate::watch::spawn_child_watch;
use anyhow::Context;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use waypoint_core::{Event, Index, Resolution, Source};

pub struct TreeBackend<C: Connector, D: NodeCodec> {
    conn: Arc<ConnectionManager<C>>,
    namespace: Namespace,
    codec: D,
    policy: RetryPolicy,
    pool: ContextPool<D::Node>,
    events: broadcast::Sender<Event>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
    watch_restart_delay: Duration,
}

impl<C: Connector, D: NodeCodec> TreeBackend<C, D> {
    pub fn new(connector: C, codec: D, paths: PathMap, config: &TreeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            conn: Arc::new(ConnectionManager::new(
                connector,
                config.endpoints.clone(),
                config.session_timeout,
                config.close_grace,
            )),
            namespace: Namespace::new(paths),
            codec,
            policy: RetryPolicy::new(config.retry_attempts, config.retry_step),
            pool: ContextPool::new(config.pool_capacity),
            events,
            watchers: Mutex::new(Vec::new()),
            watch_restart_delay: config.watch_restart_delay,
        }
    }

    /// Swaps the namespace and coordination service addresses, then re-arms
    /// child watches for the new set of keys.
    pub fn reload(&self, paths: PathMap, addrs: Vec<String>) {
        info!(keys = paths.len(), addrs = ?addrs, "Reloading tree backend");
        self.namespace.reload(paths);
        self.conn.reload(addrs);
        self.restart_watchers();
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.conn
    }

    /// Walks `root` and wraps whatever leaves could be read.
    async fn resolve(&self, index: &Index, root: &str) -> Result<D::Endpoint, TreeError> {
        let walker = Walker {
            conn: &self.conn,
            codec: &self.codec,
            policy: &self.policy,
        };

        let mut ctx = self.pool.checkout();
        walker.walk(root, &mut ctx).await;

        let result = if ctx.nodes.is_empty() {
            // Any infrastructure failure means the subtree was not fully seen
            Err(ctx
                .last_transient
                .take()
                .or_else(|| ctx.last_error.take())
                .unwrap_or_else(|| TreeError::Empty(root.to_string())))
        } else {
            if ctx.failures > 0 {
                info!(
                    key = %index,
                    path = root,
                    collected = ctx.nodes.len(),
                    failed = ctx.failures,
                    "Partial walk, continuing with collected nodes"
                );
            }
            self.codec
                .wrap(index, &ctx.nodes)
                .ok_or_else(|| TreeError::Wrap(index.to_string()))
        };

        self.pool.give_back(ctx);
        result
    }

    fn restart_watchers(&self) {
        let mut watchers = self.watchers.lock();
        for handle in watchers.drain(..) {
            handle.abort();
        }

        for (key, path) in self.namespace.entries().iter() {
            watchers.push(spawn_child_watch(
                Arc::clone(&self.conn),
                key.clone(),
                path.clone(),
                self.events.clone(),
                self.watch_restart_delay,
            ));
        }
        debug!(watchers = watchers.len(), "Child watches armed");
    }
}

impl<C: Connector, D: NodeCodec> Drop for TreeBackend<C, D> {
    fn drop(&mut self) {
        for handle in self.watchers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[async_trait]
impl<C: Connector, D: NodeCodec> Source for TreeBackend<C, D> {
    type Endpoint = D::Endpoint;

    async fn init(&self) -> anyhow::Result<()> {
        self.conn
            .conn()
            .await
            .context("Failed to connect to coordination service")?;
        self.restart_watchers();
        Ok(())
    }

    async fn get(&self, index: &Index) -> Resolution<D::Endpoint> {
        let Some(root) = self.namespace.query(index.as_str()) else {
            info!(key = %index, "No registry path configured for key");
            return Resolution::Absent;
        };

        match self.resolve(index, &root).await {
            Ok(endpoint) => Resolution::Found(endpoint),
            Err(e) if e.is_transient() => {
                error!(key = %index, path = %root, error = %e, "Registry unavailable");
                Resolution::Unavailable
            }
            Err(e) => {
                info!(key = %index, path = %root, error = %e, "Key resolved to nothing");
                Resolution::Absent
            }
        }
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<D::Endpoint>> {
        let paths = self.namespace.entries();
        let mut keys: Vec<&String> = paths.keys().collect();
        keys.sort();

        let mut endpoints = Vec::with_capacity(keys.len());
        for key in keys {
            let index = Index::from(key.as_str());
            match self.resolve(&index, &paths[key]).await {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) => info!(key = %key, error = %e, "Skipping key in snapshot"),
            }
        }
        Ok(endpoints)
    }

    fn watch(&self) -> BoxStream<'static, Event> {
        let rx = self.events.subscribe();
        futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Event subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
