//! Etcd Tree Client
//!
//! Presents etcd's flat key space as a tree: `/a/b/c` is a node whose
//! children are the distinct next path segments found under `/a/b/c/`.

use crate::client::{ChildWatch, Connector, TreeClient, TreeError, WatchEventKind};
use crate::config::TreeConfig;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use etcd_client::{Client, ConnectOptions, GetOptions, WatchOptions};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

fn child_prefix(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}

fn map_err(e: etcd_client::Error) -> TreeError {
    match e {
        etcd_client::Error::TransportError(_) | etcd_client::Error::IoError(_) => {
            TreeError::ConnectionClosed
        }
        etcd_client::Error::GRpcStatus(status) => {
            debug!(status = %status, "etcd request rejected");
            TreeError::Unknown
        }
        other => TreeError::Other(other.to_string()),
    }
}

/// Distinct first segments of `keys` below `prefix`, in order of first appearance
fn child_names<'k>(prefix: &str, keys: impl Iterator<Item = &'k str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut children: Vec<String> = Vec::new();
    for key in keys {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        let Some(child) = rest.split('/').next().filter(|c| !c.is_empty()) else {
            continue;
        };
        // `a-b` sorts between `a` and `a/1`, so repeats are not always adjacent
        if seen.insert(child) {
            children.push(child.to_string());
        }
    }
    children
}

/// Connects to etcd with exponential backoff
#[derive(Debug, Clone)]
pub struct EtcdConnector {
    backoff_initial: Duration,
    backoff_max: Duration,
    backoff_max_elapsed: Duration,
    backoff_multiplier: f64,
}

impl EtcdConnector {
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            backoff_initial: config.connect_backoff_initial,
            backoff_max: config.connect_backoff_max,
            backoff_max_elapsed: config.connect_backoff_max_elapsed,
            backoff_multiplier: config.connect_backoff_multiplier,
        }
    }
}

#[async_trait]
impl Connector for EtcdConnector {
    type Client = EtcdTreeClient;

    async fn connect(
        &self,
        addrs: &[String],
        session_timeout: Duration,
    ) -> Result<EtcdTreeClient, TreeError> {
        let backoff = ExponentialBackoff {
            initial_interval: self.backoff_initial,
            max_interval: self.backoff_max,
            max_elapsed_time: Some(self.backoff_max_elapsed),
            multiplier: self.backoff_multiplier,
            ..Default::default()
        };

        let client = retry(backoff, || async {
            let options = ConnectOptions::new()
                .with_connect_timeout(session_timeout)
                .with_timeout(session_timeout);
            match Client::connect(addrs, Some(options)).await {
                Ok(client) => {
                    debug!("Connected to etcd");
                    Ok(client)
                }
                Err(e) => {
                    warn!(error = %e, "etcd connection failed, retrying");
                    Err(backoff::Error::transient(e))
                }
            }
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "Giving up on etcd connection");
            TreeError::NoServer
        })?;

        Ok(EtcdTreeClient { client })
    }
}

pub struct EtcdTreeClient {
    client: Client,
}

#[async_trait]
impl TreeClient for EtcdTreeClient {
    async fn children(&self, path: &str) -> Result<Vec<String>, TreeError> {
        let prefix = child_prefix(path);
        let mut client = self.client.clone();

        let resp = client
            .get(
                prefix.as_str(),
                Some(GetOptions::new().with_prefix().with_keys_only()),
            )
            .await
            .map_err(map_err)?;

        let keys = resp.kvs().iter().filter_map(|kv| kv.key_str().ok());
        let children = child_names(&prefix, keys);

        if children.is_empty() {
            // A childless path must still exist as a key to count as a leaf
            let exists = client
                .get(path, Some(GetOptions::new().with_keys_only()))
                .await
                .map_err(map_err)?;
            if exists.kvs().is_empty() {
                return Err(TreeError::NoNode(path.to_string()));
            }
        }

        trace!(path = path, children = children.len(), "Listed children");
        Ok(children)
    }

    async fn data(&self, path: &str) -> Result<Vec<u8>, TreeError> {
        let mut client = self.client.clone();
        let resp = client.get(path, None).await.map_err(map_err)?;

        resp.kvs()
            .first()
            .map(|kv| kv.value().to_vec())
            .ok_or_else(|| TreeError::NoNode(path.to_string()))
    }

    async fn watch_children(&self, path: &str) -> Result<ChildWatch, TreeError> {
        let prefix = child_prefix(path);
        let mut client = self.client.clone();

        let (mut watcher, mut stream) = client
            .watch(prefix.as_str(), Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(map_err)?;

        let (mut tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let mut fired = false;
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        trace!(prefix = %prefix, "Watch waiter gone");
                        break;
                    }
                    msg = stream.message() => match msg {
                        Ok(Some(resp)) if resp.canceled() => {
                            warn!(prefix = %prefix, "Watch stream canceled");
                            break;
                        }
                        Ok(Some(resp)) => {
                            if !resp.events().is_empty() {
                                fired = true;
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(prefix = %prefix, error = %e, "Watch stream failed");
                            break;
                        }
                    },
                }
            }

            // Dropping `tx` without sending reports the loss to the waiter
            if fired {
                let _ = tx.send(WatchEventKind::ChildrenChanged);
            }
            let _ = watcher.cancel().await;
        });

        Ok(rx)
    }

    async fn close(&self) {
        debug!("etcd client released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_prefix() {
        assert_eq!(child_prefix("/svc"), "/svc/");
        assert_eq!(child_prefix("/svc/"), "/svc/");
        assert_eq!(child_prefix("/"), "/");
    }

    #[test]
    fn test_child_names_dedupes_segments() {
        let keys = [
            "/svc/a",
            "/svc/a/1",
            "/svc/a/2",
            "/svc/b",
            "/svc/c/x/y",
            "/other/z",
        ];

        let children = child_names("/svc/", keys.into_iter());

        assert_eq!(children, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_child_names_dedupes_interleaved_segments() {
        // etcd byte order puts `a-b` between `a` and `a/1`
        let keys = ["/svc/a", "/svc/a-b", "/svc/a/1", "/svc/a/2"];

        let children = child_names("/svc/", keys.into_iter());

        assert_eq!(children, vec!["a", "a-b"]);
    }

    #[test]
    fn test_child_names_skips_trailing_slash_key() {
        let children = child_names("/svc/", ["/svc/"].into_iter());
        assert!(children.is_empty());
    }
}
