//! Type definitions for roastrack

mod error;
mod records;

pub use error::*;
pub use records::*;

/// Where a source's data came from on this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// Fetched from the upstream API
    Fresh,
    /// Served from an unexpired cache
    Cached,
    /// Upstream failed; served from an expired cache
    Stale(String),
    /// Upstream failed and nothing was cached; entries are empty
    Unavailable(String),
}

impl SourceStatus {
    pub fn is_available(&self) -> bool {
        !matches!(self, SourceStatus::Unavailable(_))
    }
}
