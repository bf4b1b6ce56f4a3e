//! Background Loops
//!
//! The three tasks that keep the cache fresh:
//! - prober: marks expired entries stale on a fixed tick
//! - updater: re-resolves queued entries, one at a time, with a pause between
//! - watch dispatcher: turns source events into pending refreshes

use crate::cache::{EntryRef, Shared};
use crate::events;
use crate::metrics;
use crate::source::{Event, Source};
use futures::stream::BoxStream;
use futures::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Random slice of the TTL, `ttl * k / 10` with `k` uniform in `[1, 10]`.
/// Spreads refreshes that would otherwise land on the same tick.
pub fn jitter(ttl: Duration) -> Duration {
    let k: u32 = rand::rng().random_range(1..=10);
    ttl * k / 10
}

/// Spawns the expiry scan
pub(crate) fn spawn_prober<S: Source>(shared: Arc<Shared<S>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(shared.config.probe_interval);
        interval.tick().await; // Skip first immediate tick

        loop {
            let now = interval.tick().await;

            let mut marked = 0usize;
            for item in shared.entries.iter() {
                if item.value().mark_stale_if_expired(now) {
                    events::entry_marked_stale(item.key().as_str());
                    marked += 1;
                }
            }

            metrics::set_entry_count(shared.entries.len());
            trace!(
                entries = shared.entries.len(),
                marked = marked,
                "Probe round completed"
            );
        }
    })
}

/// Spawns the updater draining the refresh queue
pub(crate) fn spawn_updater<S: Source>(
    shared: Arc<Shared<S>>,
    mut queue: mpsc::UnboundedReceiver<EntryRef<S>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = queue.recv().await {
            let state = entry.refresh_state();
            if state.needs_resolution() {
                // One round trip per index: a first resolution in flight holds the gate
                let Some(_gate) = entry.try_gate() else {
                    trace!(key = %entry.index(), "First resolution in flight, requeueing");
                    shared.enqueue(Arc::clone(&entry));
                    tokio::time::sleep(shared.config.update_quantum).await;
                    continue;
                };
                trace!(key = %entry.index(), state = ?state, "Refreshing entry");
                shared.refresh(&entry).await;
            } else {
                debug!(key = %entry.index(), state = ?state, "Queued entry not pending");
            }
            entry.reset_idle();

            tokio::time::sleep(shared.config.update_quantum).await;
        }
        debug!("Refresh queue closed, updater exiting");
    })
}

/// Spawns the dispatcher for the source's event stream
pub(crate) fn spawn_watch_dispatcher<S: Source>(
    shared: Arc<Shared<S>>,
    mut events: BoxStream<'static, Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            shared.apply_event(event);
        }
        warn!("Source event stream ended, push invalidation disabled");
    })
}
