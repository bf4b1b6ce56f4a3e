//! Connection Manager
//!
//! Owns the single shared client. Connects lazily, replaces the client when
//! a caller reports a dead session and closes superseded clients only after a
//! grace period so operations already holding them can finish.

use crate::client::{Connector, TreeClient, TreeError};
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub struct ConnectionManager<C: Connector> {
    connector: C,
    addrs: RwLock<Vec<String>>,
    current: ArcSwapOption<C::Client>,
    /// Serializes connection establishment
    connecting: Mutex<()>,
    /// Set by `reload`; the next `conn` call reconnects to the new addresses
    stale: AtomicBool,
    generation: AtomicU64,
    session_timeout: Duration,
    close_grace: Duration,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        addrs: Vec<String>,
        session_timeout: Duration,
        close_grace: Duration,
    ) -> Self {
        Self {
            connector,
            addrs: RwLock::new(addrs),
            current: ArcSwapOption::empty(),
            connecting: Mutex::new(()),
            stale: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            session_timeout,
            close_grace,
        }
    }

    /// Current client, connecting first if there is none.
    pub async fn conn(&self) -> Result<Arc<C::Client>, TreeError> {
        if let Some(client) = self.usable() {
            return Ok(client);
        }

        let _guard = self.connecting.lock().await;
        if let Some(client) = self.usable() {
            return Ok(client);
        }
        self.establish().await
    }

    /// Replaces `failed` with a fresh client. When another caller already
    /// replaced it, returns the newer client without connecting again.
    pub async fn reconnect(&self, failed: &Arc<C::Client>) -> Result<Arc<C::Client>, TreeError> {
        let _guard = self.connecting.lock().await;
        if let Some(client) = self.current.load_full() {
            if !Arc::ptr_eq(&client, failed) {
                debug!("Connection already replaced by another caller");
                return Ok(client);
            }
        }
        self.establish().await
    }

    /// New coordination service addresses, used from the next connection on.
    pub fn reload(&self, addrs: Vec<String>) {
        *self.addrs.write() = addrs;
        self.stale.store(true, Ordering::Release);
    }

    pub fn addrs(&self) -> Vec<String> {
        self.addrs.read().clone()
    }

    /// Number of connections established so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn usable(&self) -> Option<Arc<C::Client>> {
        if self.stale.load(Ordering::Acquire) {
            return None;
        }
        self.current.load_full()
    }

    /// Caller must hold `connecting`.
    async fn establish(&self) -> Result<Arc<C::Client>, TreeError> {
        let addrs = self.addrs.read().clone();

        let client = match self.connector.connect(&addrs, self.session_timeout).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!(addrs = ?addrs, error = %e, "Failed to connect to coordination service");
                return Err(e);
            }
        };

        self.stale.store(false, Ordering::Release);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(old) = self.current.swap(Some(Arc::clone(&client))) {
            self.retire(old);
        }

        info!(
            addrs = ?addrs,
            generation = generation,
            "Connected to coordination service"
        );
        Ok(client)
    }

    fn retire(&self, old: Arc<C::Client>) {
        let grace = self.close_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            old.close().await;
            debug!("Superseded connection closed");
        });
    }
}
