//! Structured Events
//!
//! One function per cache event so field names stay consistent across the
//! prober, the updater and the watch dispatcher.
//!
//! Event types:
//! - `entry_marked_stale` - TTL elapsed, entry awaits refresh
//! - `entry_refreshed` - updater finished a resolution
//! - `watch_event_applied` - registry push scheduled a refresh
//! - `watch_event_dropped` - registry push collapsed into a pending refresh
//! - `resolution_failed` - backend could not answer for a key

use tracing::{debug, info, warn};

/// Emit an entry marked stale event
pub fn entry_marked_stale(key: &str) {
    debug!(
        event_type = "entry_marked_stale",
        key = %key,
        "Cache entry expired"
    );
}

/// Emit an entry refreshed event
pub fn entry_refreshed(key: &str, outcome: &str, changed: bool) {
    if changed {
        info!(
            event_type = "entry_refreshed",
            key = %key,
            outcome = %outcome,
            changed = changed,
            "Cache entry refreshed"
        );
    } else {
        debug!(
            event_type = "entry_refreshed",
            key = %key,
            outcome = %outcome,
            changed = changed,
            "Cache entry refreshed"
        );
    }
}

/// Emit a watch event applied event
pub fn watch_event_applied(key: &str, kind: &str) {
    info!(
        event_type = "watch_event_applied",
        key = %key,
        kind = %kind,
        "Watch event scheduled refresh"
    );
}

/// Emit a watch event dropped event
pub fn watch_event_dropped(key: &str, kind: &str, reason: &str) {
    debug!(
        event_type = "watch_event_dropped",
        key = %key,
        kind = %kind,
        reason = %reason,
        "Watch event dropped"
    );
}

/// Emit a resolution failed event
pub fn resolution_failed(key: &str, reason: &str) {
    warn!(
        event_type = "resolution_failed",
        key = %key,
        reason = %reason,
        "Resolution failed"
    );
}
