//! Child Watches
//!
//! One task per namespace key keeps a one-shot child watch armed on the key's
//! root path and republishes every firing as a `ChildrenChanged` event.

use crate::client::{Connector, TreeClient, WatchEventKind};
use crate::connection::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use waypoint_core::Event;

pub(crate) fn spawn_child_watch<C: Connector>(
    conn: Arc<ConnectionManager<C>>,
    key: String,
    path: String,
    events: broadcast::Sender<Event>,
    restart_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(key = %key, path = %path, "Child watch started");

        loop {
            let client = match conn.conn().await {
                Ok(client) => client,
                Err(e) => {
                    error!(key = %key, path = %path, error = %e, "No connection for child watch");
                    tokio::time::sleep(restart_delay).await;
                    continue;
                }
            };

            let watch = match client.watch_children(&path).await {
                Ok(watch) => watch,
                Err(e) => {
                    error!(key = %key, path = %path, error = %e, "Failed to arm child watch");
                    // Only the client that failed may be replaced
                    if e.needs_reconnect() {
                        if let Err(reconnect_err) = conn.reconnect(&client).await {
                            warn!(key = %key, error = %reconnect_err, "Reconnect after watch failure failed");
                        }
                    }
                    drop(client);
                    tokio::time::sleep(restart_delay).await;
                    continue;
                }
            };
            drop(client);

            match watch.await {
                Ok(WatchEventKind::ChildrenChanged) => {
                    info!(key = %key, path = %path, "Registry children changed");
                    if events.send(Event::children_changed(key.as_str())).is_err() {
                        trace!(key = %key, "No event subscribers");
                    }
                }
                Ok(kind) => {
                    trace!(key = %key, kind = ?kind, "Ignoring node event");
                }
                Err(_) => {
                    warn!(key = %key, path = %path, "Child watch dropped by session, re-arming");
                    tokio::time::sleep(restart_delay).await;
                }
            }
        }
    })
}
