//! Tree Backend Configuration
//!
//! Connection, retry and watch settings for the tree backend with environment
//! variable overrides.

use std::time::Duration;

/// Tree backend configuration with sensible defaults
#[derive(Debug, Clone)]
pub struct TreeConfig {
    /// Coordination service endpoints (env: ETCD_ENDPOINTS, comma-separated)
    pub endpoints: Vec<String>,

    // Connection settings
    /// Session / request timeout handed to the connector
    pub session_timeout: Duration,

    /// How long a superseded connection stays open for in-flight operations
    pub close_grace: Duration,

    // Walk settings
    /// Attempts per children listing or leaf read
    pub retry_attempts: u32,

    /// Linear backoff step; the n-th retry waits `n * retry_step`
    pub retry_step: Duration,

    /// Traversal contexts kept around for reuse
    pub pool_capacity: usize,

    // Watch settings
    /// Delay before re-arming a child watch after an error
    pub watch_restart_delay: Duration,

    /// Buffered events per subscriber before the slowest one lags
    pub event_capacity: usize,

    // Etcd connect backoff settings
    /// Initial interval for etcd connection retry
    pub connect_backoff_initial: Duration,

    /// Maximum interval for etcd connection retry
    pub connect_backoff_max: Duration,

    /// Maximum elapsed time for etcd connection retries
    pub connect_backoff_max_elapsed: Duration,

    /// Multiplier for etcd connection backoff
    pub connect_backoff_multiplier: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],

            session_timeout: Duration::from_secs(10),
            close_grace: Duration::from_secs(30),

            retry_attempts: 3,
            retry_step: Duration::from_millis(200),
            pool_capacity: 32,

            watch_restart_delay: Duration::from_secs(1),
            event_capacity: 64,

            connect_backoff_initial: Duration::from_secs(1),
            connect_backoff_max: Duration::from_secs(10),
            connect_backoff_max_elapsed: Duration::from_secs(60),
            connect_backoff_multiplier: 2.0,
        }
    }
}

impl TreeConfig {
    /// Create configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoints) = std::env::var("ETCD_ENDPOINTS") {
            config.endpoints = endpoints.split(',').map(String::from).collect();
        }

        if let Ok(grace) = std::env::var("WAYPOINT_CLOSE_GRACE_SECS") {
            if let Ok(parsed) = grace.parse::<u64>() {
                config.close_grace = Duration::from_secs(parsed);
            }
        }

        config
    }
}
