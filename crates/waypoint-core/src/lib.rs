//! Waypoint Core
//!
//! Client-side service discovery cache. Resolves a service [`Index`] to an
//! [`Endpoint`] through a pluggable [`Source`], hiding registry latency and
//! transient failures behind a local table with TTL staleness detection,
//! push invalidation and single-flight cold lookups.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod events;
pub mod metrics;
mod refresh;
pub mod source;

pub use cache::DiscoveryCache;
pub use config::{clamp_ttl, CacheConfig, MAX_TTL, MIN_TTL};
pub use entry::{EntryStatus, RefreshState, ResultKind};
pub use error::DiscoveryError;
pub use refresh::jitter;
pub use source::{Endpoint, Event, EventKind, Index, Resolution, Source};
