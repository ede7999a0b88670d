//! Error types for core pipeline operations.
//!
//! None of these escape the pipeline: settings failures degrade to defaults,
//! rule errors are reported when configuration is loaded, and codec errors
//! only surface from `decode`.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Settings store could not be read or written.
    #[error("configuration unavailable: {message}")]
    ConfigUnavailable {
        /// Description of the underlying read/write failure
        message: String,
    },

    /// A trigger rule in the rule table is malformed.
    #[error("invalid trigger rule: {message}")]
    InvalidRule {
        /// Why the rule was rejected
        message: String,
    },

    /// Payload could not be parsed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a configuration-unavailable error.
    pub fn config_unavailable(message: impl Into<String>) -> Self {
        Self::ConfigUnavailable { message: message.into() }
    }

    /// Creates an invalid-rule error.
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRule { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_format() {
        let error = CoreError::config_unavailable("permission denied");
        assert_eq!(error.to_string(), "configuration unavailable: permission denied");

        let error = CoreError::invalid_rule("rule has no predicate");
        assert_eq!(error.to_string(), "invalid trigger rule: rule has no predicate");
    }

    #[test]
    fn codec_errors_convert() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = CoreError::from(parse_error);
        assert!(matches!(error, CoreError::Codec(_)));
    }
}
