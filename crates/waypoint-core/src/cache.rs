//! Discovery Cache
//!
//! Owns the index → entry table and the three background loops that keep it
//! fresh. Lookups are served from the table; a cold index is resolved once no
//! matter how many callers ask for it concurrently.

use crate::config::{clamp_ttl, CacheConfig};
use crate::entry::{CacheEntry, EntryStatus, RefreshState, ResultKind};
use crate::error::DiscoveryError;
use crate::events;
use crate::metrics;
use crate::refresh::{jitter, spawn_prober, spawn_updater, spawn_watch_dispatcher};
use crate::source::{Endpoint, Event, EventKind, Index, Resolution, Source};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub(crate) type EntryRef<S> = Arc<CacheEntry<<S as Source>::Endpoint>>;

/// State shared between the public handle and the background loops
pub(crate) struct Shared<S: Source> {
    pub source: S,
    pub entries: DashMap<Index, EntryRef<S>>,
    pub ttl: Duration,
    pub config: CacheConfig,
    queue: mpsc::UnboundedSender<EntryRef<S>>,
}

enum Lookup<E> {
    Ready(Result<E, DiscoveryError>),
    /// A first resolution is in flight; wait for it and read again
    InFlight,
}

impl<S: Source> Shared<S> {
    /// Hand an entry to the updater. Each entry is queued at most once per
    /// departure from `Idle`, so the queue never outgrows the table.
    pub(crate) fn enqueue(&self, entry: EntryRef<S>) {
        if self.queue.send(entry).is_err() {
            warn!("Refresh queue closed, dropping refresh");
        }
    }

    /// `Stale -> Refreshing`, then queue. Loses quietly to a concurrent reader.
    fn schedule_refresh(&self, entry: &EntryRef<S>) {
        if entry.transition(RefreshState::Stale, RefreshState::Refreshing) {
            self.enqueue(Arc::clone(entry));
        }
    }

    fn read_entry(&self, entry: &EntryRef<S>) -> Lookup<S::Endpoint> {
        let slot = entry.read();

        if entry.refresh_state() == RefreshState::Stale {
            self.schedule_refresh(entry);
        }

        match slot.result {
            ResultKind::Resolving => Lookup::InFlight,
            ResultKind::Miss => Lookup::Ready(Err(DiscoveryError::NotFound(entry.index().clone()))),
            ResultKind::Hit => match slot.endpoint {
                Some(endpoint) if endpoint.index() == entry.index() => Lookup::Ready(Ok(endpoint)),
                Some(endpoint) => {
                    error!(
                        key = %entry.index(),
                        endpoint_key = %endpoint.index(),
                        "Cached endpoint belongs to another index"
                    );
                    Lookup::Ready(Err(DiscoveryError::Assertion(entry.index().clone())))
                }
                None => {
                    error!(key = %entry.index(), "Entry tagged as hit has no endpoint");
                    Lookup::Ready(Err(DiscoveryError::Unknown(entry.index().clone())))
                }
            },
        }
    }

    /// First resolution of a freshly inserted entry. The caller holds the
    /// entry's resolution gate for the whole round trip.
    async fn resolve_first(&self, entry: &EntryRef<S>) -> Result<S::Endpoint, DiscoveryError> {
        let index = entry.index().clone();
        metrics::record_resolution("first");
        let resolution = self.source.get(&index).await;
        let now = Instant::now();

        match resolution {
            Resolution::Found(endpoint) if endpoint.index() == &index => {
                entry.store_hit(endpoint.clone(), now + self.ttl);
                debug!(key = %index, "Resolved on first lookup");
                Ok(endpoint)
            }
            Resolution::Found(endpoint) => {
                error!(
                    key = %index,
                    endpoint_key = %endpoint.index(),
                    "Source returned an endpoint for another index"
                );
                entry.store_miss(now + self.ttl);
                Err(DiscoveryError::Assertion(index))
            }
            Resolution::Absent => {
                entry.store_miss(now + self.ttl);
                debug!(key = %index, "Negative-cached on first lookup");
                Err(DiscoveryError::NotFound(index))
            }
            Resolution::Unavailable => {
                // Not a genuine negative: record a short-lived miss and retry
                // in the background right away.
                entry.store_miss(now + self.ttl / 2);
                events::resolution_failed(index.as_str(), "source unavailable on first lookup");
                if entry.transition(RefreshState::Idle, RefreshState::Stale) {
                    self.schedule_refresh(entry);
                }
                Err(DiscoveryError::Unavailable(index))
            }
        }
    }

    /// The caller performing the first resolution went away before it
    /// finished. Leave a short miss behind and retry in the background.
    fn abandon_first(&self, entry: &EntryRef<S>) {
        entry.store_miss(Instant::now() + self.ttl / 2);
        warn!(key = %entry.index(), "First resolution cancelled, retrying in background");
        if entry.transition(RefreshState::Idle, RefreshState::Stale) {
            self.schedule_refresh(entry);
        }
    }

    /// Background re-resolution run by the updater.
    pub(crate) async fn refresh(&self, entry: &EntryRef<S>) {
        let index = entry.index();
        metrics::record_resolution("refresh");
        let resolution = self.source.get(index).await;
        let now = Instant::now();

        match resolution {
            Resolution::Found(endpoint) if endpoint.index() == index => {
                let changed = entry.store_hit(endpoint, now + self.ttl + jitter(self.ttl));
                metrics::record_refresh("hit");
                events::entry_refreshed(index.as_str(), "hit", changed);
            }
            Resolution::Found(endpoint) => {
                error!(
                    key = %index,
                    endpoint_key = %endpoint.index(),
                    "Source returned an endpoint for another index"
                );
                entry.store_miss(now + self.ttl / 2 + jitter(self.ttl));
                metrics::record_refresh("miss");
            }
            Resolution::Absent => {
                entry.store_miss(now + self.ttl / 2 + jitter(self.ttl));
                metrics::record_refresh("miss");
                events::entry_refreshed(index.as_str(), "miss", true);
            }
            Resolution::Unavailable => {
                // Keep serving the last known value, check again sooner.
                entry.extend(now + self.ttl / 2 + jitter(self.ttl));
                metrics::record_refresh("unavailable");
                events::resolution_failed(index.as_str(), "source unavailable during refresh");
            }
        }
    }

    /// Translate one registry push into a pending refresh.
    pub(crate) fn apply_event(&self, event: Event) {
        let kind = format!("{:?}", event.kind);
        let (entry, pending) = match event.kind {
            EventKind::Removed => {
                let Some(entry) = self.entries.get(&event.index).map(|e| Arc::clone(e.value()))
                else {
                    events::watch_event_dropped(event.index.as_str(), &kind, "unknown index");
                    return;
                };
                (entry, RefreshState::PendingRemove)
            }
            EventKind::Added | EventKind::ChildrenChanged => {
                let expiry = Instant::now() + self.ttl;
                let entry = self
                    .entries
                    .entry(event.index.clone())
                    .or_insert_with(|| Arc::new(CacheEntry::unresolved(event.index.clone(), expiry)))
                    .value()
                    .clone();
                let pending = if event.kind == EventKind::Added {
                    RefreshState::PendingAdd
                } else {
                    RefreshState::PendingChange
                };
                (entry, pending)
            }
        };

        if entry.transition(RefreshState::Idle, pending) {
            events::watch_event_applied(event.index.as_str(), &kind);
            self.enqueue(entry);
        } else {
            events::watch_event_dropped(event.index.as_str(), &kind, "refresh already pending");
        }
    }
}

/// Armed while a first resolution is running
struct FirstResolution<'a, S: Source> {
    shared: &'a Shared<S>,
    entry: &'a EntryRef<S>,
    done: bool,
}

impl<S: Source> Drop for FirstResolution<'_, S> {
    fn drop(&mut self) {
        if !self.done {
            self.shared.abandon_first(self.entry);
        }
    }
}

/// Client-side service discovery cache
pub struct DiscoveryCache<S: Source> {
    shared: Arc<Shared<S>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: Source> DiscoveryCache<S> {
    /// Build a cache over `source` with the given TTL and default timings.
    /// A TTL outside `[10s, 30s]` is replaced by 30s.
    pub async fn new(source: S, ttl: Duration) -> Result<Self, DiscoveryError> {
        Self::with_config(source, CacheConfig::default().with_ttl(ttl)).await
    }

    /// Build a cache with explicit timings. Must run inside a tokio runtime.
    pub async fn with_config(source: S, config: CacheConfig) -> Result<Self, DiscoveryError> {
        let config = config.normalized();
        let ttl = clamp_ttl(config.ttl);
        if ttl != config.ttl {
            warn!(
                requested_ms = config.ttl.as_millis() as u64,
                effective_ms = ttl.as_millis() as u64,
                "TTL out of range, clamped"
            );
        }

        source.init().await.map_err(DiscoveryError::Init)?;
        let snapshot = source.fetch_all().await.map_err(DiscoveryError::Init)?;

        let entries = DashMap::with_capacity(snapshot.len());
        let expiry = Instant::now() + ttl;
        for endpoint in snapshot {
            let index = endpoint.index().clone();
            entries.insert(index, Arc::new(CacheEntry::resolved(endpoint, expiry)));
        }
        metrics::set_entry_count(entries.len());
        info!(
            seeded = entries.len(),
            ttl_secs = ttl.as_secs(),
            "Discovery cache initialized"
        );

        let (queue, queue_rx) = mpsc::unbounded_channel();
        let watch = source.watch();
        let shared = Arc::new(Shared {
            source,
            entries,
            ttl,
            config,
            queue,
        });

        let tasks = vec![
            spawn_prober(Arc::clone(&shared)),
            spawn_updater(Arc::clone(&shared), queue_rx),
            spawn_watch_dispatcher(Arc::clone(&shared), watch),
        ];

        Ok(Self { shared, tasks })
    }

    /// Resolve `index` to its endpoint.
    ///
    /// Cached values are returned immediately, even when stale (a background
    /// refresh is scheduled instead). A cold index triggers exactly one source
    /// lookup; concurrent callers wait for that lookup and share its result.
    pub async fn get(&self, index: &Index) -> Result<S::Endpoint, DiscoveryError> {
        loop {
            let existing = self
                .shared
                .entries
                .get(index)
                .map(|e| Arc::clone(e.value()));

            if let Some(entry) = existing {
                match self.shared.read_entry(&entry) {
                    Lookup::Ready(result) => {
                        if result.is_ok() {
                            metrics::record_hit();
                        }
                        return result;
                    }
                    Lookup::InFlight => {
                        entry.wait_resolved().await;
                        continue;
                    }
                }
            }

            // slow path
            let candidate = Arc::new(CacheEntry::resolving(
                index.clone(),
                Instant::now() + self.shared.ttl,
            ));
            let Some(gate) = candidate.try_gate() else {
                continue;
            };

            let won = match self.shared.entries.entry(index.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::clone(&candidate));
                    true
                }
            };
            if !won {
                // Lost the race; the fast path will wait on the winner.
                continue;
            }

            metrics::record_miss();
            metrics::set_entry_count(self.shared.entries.len());

            // Dropped before `gate`, so waiters never see a `Resolving` slot
            // left behind by a cancelled caller
            let mut pending = FirstResolution {
                shared: self.shared.as_ref(),
                entry: &candidate,
                done: false,
            };
            let result = self.shared.resolve_first(&candidate).await;
            pending.done = true;
            drop(pending);
            drop(gate);
            return result;
        }
    }

    /// The TTL actually in effect after clamping.
    pub fn effective_ttl(&self) -> Duration {
        self.shared.ttl
    }

    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Status of every entry, for diagnostics.
    pub fn snapshot(&self) -> Vec<(Index, EntryStatus)> {
        let now = Instant::now();
        self.shared
            .entries
            .iter()
            .map(|item| (item.key().clone(), item.value().status(now)))
            .collect()
    }

    /// Status of a single entry, if present.
    pub fn status(&self, index: &Index) -> Option<EntryStatus> {
        let now = Instant::now();
        self.shared.entries.get(index).map(|e| e.value().status(now))
    }

    /// Stop the background loops. Lookups keep working against the table but
    /// nothing is refreshed afterwards.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Discovery cache loops stopped");
    }
}

impl<S: Source> Drop for DiscoveryCache<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
