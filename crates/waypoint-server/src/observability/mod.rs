//! Observability Module
//!
//! - `metrics`: Prometheus exporter and HTTP-level metrics
//! - `tracing`: log subscriber setup

pub mod metrics;
pub mod tracing;

pub use self::metrics::{init_metrics, MetricsState};
pub use self::tracing::{init_tracing, TracingConfig};
