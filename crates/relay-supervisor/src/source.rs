//! Boundary traits for the platform event source.
//!
//! The platform mechanism that produces notification events is not part of
//! this crate. It pushes `RawEvent`s onto the pipeline channel on its own,
//! reports availability changes as [`SourceSignal`]s, and exposes
//! [`EventSource::resubscribe`] so the supervisor can force a fresh
//! subscription.

use async_trait::async_trait;

use crate::error::Result;

/// Availability change reported by an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSignal {
    /// The source is delivering events.
    Available,
    /// The source stopped delivering events.
    Lost,
}

/// A platform event source that can be asked to reconnect.
#[async_trait]
pub trait EventSource: Send + Sync + std::fmt::Debug {
    /// Tears down the current subscription and establishes a new one.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::ReconnectFailed` if the source cannot be
    /// resubscribed.
    async fn resubscribe(&self) -> Result<()>;
}

/// Reports whether the process may read platform events at all.
#[async_trait]
pub trait AccessProbe: Send + Sync + std::fmt::Debug {
    /// Whether event access is currently granted.
    async fn has_access(&self) -> bool;
}

/// Probe for sources that need no permission grant.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl AccessProbe for AlwaysGranted {
    async fn has_access(&self) -> bool {
        true
    }
}
