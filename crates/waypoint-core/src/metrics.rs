//! Cache Metrics
//!
//! Metric names and recording helpers. The library only records; installing
//! an exporter is left to the binary.
//!
//! Metrics tracked:
//! - `waypoint_cache_hits_total` - lookups answered from the table
//! - `waypoint_cache_misses_total` - lookups that fell through to the source
//! - `waypoint_backend_resolutions_total` - source round trips by path (`first`, `refresh`)
//! - `waypoint_refreshes_total` - updater outcomes (`hit`, `miss`, `unavailable`)
//! - `waypoint_cache_entries` - gauge of table size

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register descriptions for all cache metrics
pub fn register_metric_descriptions() {
    describe_counter!(
        "waypoint_cache_hits_total",
        "Lookups answered from the cache table"
    );
    describe_counter!(
        "waypoint_cache_misses_total",
        "Lookups that required a first resolution"
    );
    describe_counter!(
        "waypoint_backend_resolutions_total",
        "Round trips to the discovery source"
    );
    describe_counter!(
        "waypoint_refreshes_total",
        "Background refreshes by outcome"
    );
    describe_gauge!("waypoint_cache_entries", "Number of entries in the cache");
}

pub fn record_hit() {
    counter!("waypoint_cache_hits_total").increment(1);
}

pub fn record_miss() {
    counter!("waypoint_cache_misses_total").increment(1);
}

pub fn record_resolution(path: &'static str) {
    counter!("waypoint_backend_resolutions_total", "path" => path).increment(1);
}

pub fn record_refresh(outcome: &'static str) {
    counter!("waypoint_refreshes_total", "outcome" => outcome).increment(1);
}

pub fn set_entry_count(count: usize) {
    gauge!("waypoint_cache_entries").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_recording() {
        // No recorder installed; these must be no-ops
        register_metric_descriptions();
        record_hit();
        record_miss();
        record_resolution("first");
        record_refresh("hit");
        set_entry_count(64);
    }
}
