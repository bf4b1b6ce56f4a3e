//! Cache Entries
//!
//! One record per index plus the refresh state machine shared by the prober,
//! the updater and the watch dispatcher.
//!
//! ```text
//! Idle --(expired)--------------------> Stale --(get)--> Refreshing --(updater)--> Idle
//! Idle --(Removed/Added/ChildrenChanged)--> Pending* ---------------(updater)--> Idle
//! ```
//!
//! Every outbound transition starts from `Idle` and is a compare-and-set, so
//! overlapping triggers collapse into a single pending refresh per key.

use crate::source::{Endpoint, Index};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// Refresh state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefreshState {
    /// Nothing scheduled
    Idle = 0,
    /// TTL elapsed, waiting for the next read to schedule a refresh
    Stale = 1,
    /// Queued for the updater after a read found it stale
    Refreshing = 2,
    /// Queued after an `Added` event
    PendingAdd = 3,
    /// Queued after a `Removed` event
    PendingRemove = 4,
    /// Queued after a `ChildrenChanged` event
    PendingChange = 5,
}

impl RefreshState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RefreshState::Stale,
            2 => RefreshState::Refreshing,
            3 => RefreshState::PendingAdd,
            4 => RefreshState::PendingRemove,
            5 => RefreshState::PendingChange,
            _ => RefreshState::Idle,
        }
    }

    /// States the updater resolves against the source
    pub fn needs_resolution(self) -> bool {
        matches!(
            self,
            RefreshState::Refreshing
                | RefreshState::PendingAdd
                | RefreshState::PendingRemove
                | RefreshState::PendingChange
        )
    }
}

/// What the last completed resolution produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// First resolution still in flight; the resolution gate is held
    Resolving,
    Hit,
    Miss,
}

#[derive(Debug, Clone)]
pub(crate) struct Slot<E> {
    pub endpoint: Option<E>,
    pub result: ResultKind,
    pub expiry: Instant,
}

/// Point-in-time view of an entry, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStatus {
    pub result: ResultKind,
    pub refresh: RefreshState,
    pub expires_in: Duration,
}

/// Per-index cache record
#[derive(Debug)]
pub struct CacheEntry<E> {
    index: Index,
    refresh: AtomicU8,
    slot: RwLock<Slot<E>>,
    /// Held across every source round trip for this index: the first
    /// resolution or an updater refresh
    gate: Mutex<()>,
}

impl<E: Endpoint> CacheEntry<E> {
    fn with_slot(index: Index, slot: Slot<E>) -> Self {
        Self {
            index,
            refresh: AtomicU8::new(RefreshState::Idle as u8),
            slot: RwLock::new(slot),
            gate: Mutex::new(()),
        }
    }

    /// Entry seeded from a source snapshot
    pub(crate) fn resolved(endpoint: E, expiry: Instant) -> Self {
        let index = endpoint.index().clone();
        Self::with_slot(
            index,
            Slot {
                endpoint: Some(endpoint),
                result: ResultKind::Hit,
                expiry,
            },
        )
    }

    /// Entry created by a cache miss, before its first resolution completes
    pub(crate) fn resolving(index: Index, expiry: Instant) -> Self {
        Self::with_slot(
            index,
            Slot {
                endpoint: None,
                result: ResultKind::Resolving,
                expiry,
            },
        )
    }

    /// Entry created by a watch event for an index never looked up
    pub(crate) fn unresolved(index: Index, expiry: Instant) -> Self {
        Self::with_slot(
            index,
            Slot {
                endpoint: None,
                result: ResultKind::Miss,
                expiry,
            },
        )
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn refresh_state(&self) -> RefreshState {
        RefreshState::from_u8(self.refresh.load(Ordering::Acquire))
    }

    /// Compare-and-set on the refresh state.
    pub(crate) fn transition(&self, from: RefreshState, to: RefreshState) -> bool {
        self.refresh
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Only the updater calls this.
    pub(crate) fn reset_idle(&self) {
        self.refresh
            .store(RefreshState::Idle as u8, Ordering::Release);
    }

    pub(crate) fn read(&self) -> Slot<E> {
        self.slot.read().clone()
    }

    /// Mark the entry stale if its expiry has passed. Entries mid-resolution
    /// and entries already away from `Idle` are left alone.
    pub(crate) fn mark_stale_if_expired(&self, now: Instant) -> bool {
        {
            let slot = self.slot.read();
            if slot.expiry > now || slot.result == ResultKind::Resolving {
                return false;
            }
        }
        self.transition(RefreshState::Idle, RefreshState::Stale)
    }

    /// Record a successful resolution. Returns true when the endpoint differs
    /// from the one previously stored.
    pub(crate) fn store_hit(&self, endpoint: E, expiry: Instant) -> bool {
        let mut slot = self.slot.write();
        let changed = slot.endpoint.as_ref() != Some(&endpoint);
        slot.endpoint = Some(endpoint);
        slot.result = ResultKind::Hit;
        slot.expiry = expiry;
        changed
    }

    pub(crate) fn store_miss(&self, expiry: Instant) {
        let mut slot = self.slot.write();
        slot.endpoint = None;
        slot.result = ResultKind::Miss;
        slot.expiry = expiry;
    }

    /// Push the expiry out without touching the stored result.
    pub(crate) fn extend(&self, expiry: Instant) {
        let mut slot = self.slot.write();
        if slot.result == ResultKind::Resolving {
            slot.result = ResultKind::Miss;
        }
        slot.expiry = expiry;
    }

    /// Non-blocking attempt on the resolution gate
    pub(crate) fn try_gate(&self) -> Option<MutexGuard<'_, ()>> {
        self.gate.try_lock().ok()
    }

    /// Wait until no first resolution is in flight for this entry.
    pub(crate) async fn wait_resolved(&self) {
        let _guard = self.gate.lock().await;
    }

    pub fn status(&self, now: Instant) -> EntryStatus {
        let slot = self.slot.read();
        EntryStatus {
            result: slot.result,
            refresh: self.refresh_state(),
            expires_in: slot.expiry.saturating_duration_since(now),
        }
    }
}
