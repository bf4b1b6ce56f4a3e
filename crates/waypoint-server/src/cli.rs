//! Command Line
//!
//! Every flag falls back to an environment variable.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use waypoint_core::CacheConfig;
use waypoint_tree::{PathMap, TreeConfig};

#[derive(Debug, Parser)]
#[command(name = "waypoint-server")]
#[command(about = "Service discovery resolver backed by a hierarchical registry")]
pub struct Cli {
    /// etcd endpoints (comma-separated)
    #[arg(
        long,
        env = "ETCD_ENDPOINTS",
        default_value = "http://127.0.0.1:2379",
        value_delimiter = ','
    )]
    pub etcd_endpoints: Vec<String>,

    /// HTTP listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// Cache TTL in seconds, values outside [10, 30] fall back to 30
    #[arg(long, env = "WAYPOINT_TTL_SECS", default_value_t = 30)]
    pub ttl_secs: u64,

    /// Registry paths as `key=/path` pairs (comma-separated)
    #[arg(long, env = "WAYPOINT_NAMESPACE", default_value = "", value_parser = parse_namespace)]
    pub namespace: PathMap,

    /// Log format: text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Cli {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from_env().with_ttl(Duration::from_secs(self.ttl_secs))
    }

    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            endpoints: self.etcd_endpoints.clone(),
            ..TreeConfig::from_env()
        }
    }
}

/// Checks a single namespace entry.
pub fn validate_entry(key: &str, path: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err(format!("empty key for path {path}"));
    }
    if !path.starts_with('/') {
        return Err(format!("path for {key} must be absolute, got {path:?}"));
    }
    Ok(())
}

/// Parses `key=/path,key=/path`.
pub fn parse_namespace(raw: &str) -> Result<PathMap, String> {
    let mut paths = PathMap::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, path)) = pair.split_once('=') else {
            return Err(format!("expected key=/path, got {pair:?}"));
        };
        let (key, path) = (key.trim(), path.trim());
        validate_entry(key, path)?;

        if paths.insert(key.to_string(), path.to_string()).is_some() {
            return Err(format!("duplicate key {key}"));
        }
    }

    Ok(paths)
}
