//! Cache Configuration
//!
//! Timing knobs for the discovery cache with environment variable overrides.

use std::time::Duration;
use tracing::warn;

/// Shortest accepted entry TTL
pub const MIN_TTL: Duration = Duration::from_secs(10);

/// Longest accepted entry TTL, also the fallback for out-of-range values
pub const MAX_TTL: Duration = Duration::from_secs(30);

/// Discovery cache configuration with sensible defaults
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a resolved entry before the prober marks it stale (env: WAYPOINT_TTL_SECS)
    pub ttl: Duration,

    /// Period of the expiry scan
    pub probe_interval: Duration,

    /// Pause between two updater iterations, bounds refresh throughput
    pub update_quantum: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: MAX_TTL,
            probe_interval: Duration::from_secs(2),
            update_quantum: Duration::from_millis(100),
        }
    }
}

impl CacheConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ttl) = std::env::var("WAYPOINT_TTL_SECS") {
            if let Ok(parsed) = ttl.parse::<u64>() {
                config.ttl = Duration::from_secs(parsed);
            }
        }

        if let Some(interval) = env_millis("WAYPOINT_PROBE_INTERVAL_MS") {
            config.probe_interval = interval;
        }

        if let Some(quantum) = env_millis("WAYPOINT_UPDATE_QUANTUM_MS") {
            config.update_quantum = quantum;
        }

        config
    }

    /// Replaces zero loop periods with their defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.probe_interval.is_zero() {
            warn!("Zero probe interval rejected, using default");
            self.probe_interval = defaults.probe_interval;
        }
        if self.update_quantum.is_zero() {
            warn!("Zero update quantum rejected, using default");
            self.update_quantum = defaults.update_quantum;
        }
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Positive millisecond value of `name`, if set
fn env_millis(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            warn!(var = name, value = %raw, "Ignoring invalid period, expected positive milliseconds");
            None
        }
    }
}

/// Clamp a requested TTL into the accepted window. Anything outside
/// `[MIN_TTL, MAX_TTL]` falls back to `MAX_TTL`.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    if ttl < MIN_TTL || ttl > MAX_TTL {
        MAX_TTL
    } else {
        ttl
    }
}
