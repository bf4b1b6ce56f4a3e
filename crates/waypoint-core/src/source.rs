//! Source Contract
//!
//! The boundary every registry backend implements. The cache only ever talks
//! to a registry through [`Source`]: one-time setup, point lookups, a startup
//! snapshot and a live event stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Unique string identity of a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Index(Arc<str>);

impl Index {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Index {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for Index {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl Borrow<str> for Index {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Resolved network target for exactly one [`Index`].
///
/// Implementations that carry mutable selection state (a round-robin cursor,
/// for example) should share it between clones, since the cache hands out
/// clones of the stored value.
pub trait Endpoint: Clone + PartialEq + Send + Sync + 'static {
    fn index(&self) -> &Index;
}

/// Kind of change reported by a source's event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Removed,
    Added,
    ChildrenChanged,
}

/// Push notification that the registry state behind an index moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub index: Index,
    pub kind: EventKind,
}

impl Event {
    pub fn removed(index: impl Into<Index>) -> Self {
        Self {
            index: index.into(),
            kind: EventKind::Removed,
        }
    }

    pub fn added(index: impl Into<Index>) -> Self {
        Self {
            index: index.into(),
            kind: EventKind::Added,
        }
    }

    pub fn children_changed(index: impl Into<Index>) -> Self {
        Self {
            index: index.into(),
            kind: EventKind::ChildrenChanged,
        }
    }
}

/// Outcome of a point lookup against a source.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<E> {
    /// The registry knows the index and produced an endpoint.
    Found(E),
    /// The registry genuinely has nothing for the index. Safe to cache.
    Absent,
    /// The registry could not be asked (connection loss, session trouble).
    /// Never cached as a negative answer.
    Unavailable,
}

/// Pluggable registry backend.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    type Endpoint: Endpoint;

    /// One-time setup. Called exactly once, before anything else.
    async fn init(&self) -> anyhow::Result<()>;

    /// Resolve a single index. Transient backend trouble must be reported as
    /// [`Resolution::Unavailable`], never as [`Resolution::Absent`].
    async fn get(&self, index: &Index) -> Resolution<Self::Endpoint>;

    /// Snapshot of everything the source currently knows, used to seed the cache.
    async fn fetch_all(&self) -> anyhow::Result<Vec<Self::Endpoint>>;

    /// Live event stream, open for the lifetime of the source.
    fn watch(&self) -> BoxStream<'static, Event>;
}

#[async_trait]
impl<S: Source> Source for Arc<S> {
    type Endpoint = S::Endpoint;

    async fn init(&self) -> anyhow::Result<()> {
        (**self).init().await
    }

    async fn get(&self, index: &Index) -> Resolution<Self::Endpoint> {
        (**self).get(index).await
    }

    async fn fetch_all(&self) -> anyhow::Result<Vec<Self::Endpoint>> {
        (**self).fetch_all().await
    }

    fn watch(&self) -> BoxStream<'static, Event> {
        (**self).watch()
    }
}
