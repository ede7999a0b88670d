//! Error types for event source supervision.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors raised while (re)connecting an event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// The event source could not be resubscribed.
    #[error("reconnect failed: {message}")]
    ReconnectFailed {
        /// Description of the failure
        message: String,
    },
}

impl SupervisorError {
    /// Creates a reconnect failure.
    pub fn reconnect_failed(message: impl Into<String>) -> Self {
        Self::ReconnectFailed { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_failed_display() {
        let error = SupervisorError::reconnect_failed("listener component missing");
        assert_eq!(error.to_string(), "reconnect failed: listener component missing");
    }
}
