//! Key to path namespace
//!
//! Readers see either the old or the new mapping, never a mix.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

pub type PathMap = HashMap<String, String>;

#[derive(Debug)]
pub struct Namespace {
    paths: ArcSwap<PathMap>,
}

impl Namespace {
    pub fn new(paths: PathMap) -> Self {
        Self {
            paths: ArcSwap::from_pointee(paths),
        }
    }

    /// Registry root path for `key`.
    pub fn query(&self, key: &str) -> Option<String> {
        self.paths.load().get(key).cloned()
    }

    /// Current mapping.
    pub fn entries(&self) -> Arc<PathMap> {
        self.paths.load_full()
    }

    pub fn reload(&self, paths: PathMap) {
        self.paths.store(Arc::new(paths));
    }

    pub fn len(&self) -> usize {
        self.paths.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
