//! Discovery Errors

use crate::source::Index;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The source failed to initialize or to deliver its startup snapshot.
    #[error("source initialization failed: {0}")]
    Init(#[source] anyhow::Error),

    #[error("no endpoint found for service {0}")]
    NotFound(Index),

    /// A cached or resolved value did not belong to the index it was stored under.
    #[error("cached value for service {0} has an unexpected shape")]
    Assertion(Index),

    /// An entry was tagged as a hit without carrying an endpoint.
    #[error("internal invariant violated for service {0}")]
    Unknown(Index),

    /// The first lookup hit backend trouble; a background retry is scheduled.
    #[error("service {0} is temporarily unresolvable")]
    Unavailable(Index),
}

impl DiscoveryError {
    /// True for every variant a caller should treat as "no endpoint right now".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DiscoveryError::NotFound(_)
                | DiscoveryError::Assertion(_)
                | DiscoveryError::Unavailable(_)
        )
    }
}
