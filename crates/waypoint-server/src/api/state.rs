//! Application State
//!
//! Shared state passed to all API handlers.

use crate::observability::MetricsState;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use waypoint_core::DiscoveryCache;
use waypoint_tree::{Connector, JsonNodeCodec, TreeBackend};

pub type Backend<C> = TreeBackend<C, JsonNodeCodec>;

/// Shared application state
pub struct AppState<C: Connector> {
    pub cache: Arc<DiscoveryCache<Arc<Backend<C>>>>,
    pub backend: Arc<Backend<C>>,
    pub metrics_state: Option<MetricsState>,
    pub readiness: Arc<AtomicBool>,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            backend: Arc::clone(&self.backend),
            metrics_state: self.metrics_state.clone(),
            readiness: Arc::clone(&self.readiness),
        }
    }
}
