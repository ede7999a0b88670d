//! Error types for webhook delivery.
//!
//! A delivery error never leaves the delivery task as a failure of the
//! pipeline: it ends up inside `DeliveryOutcome::Failed`, gets logged, and is
//! reported to the status observer.

use std::{fmt, time::Duration};

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors that can occur while delivering to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Connection could not be established or broke mid-request.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// The request exceeded its time budget.
    #[error("{phase} timeout after {}ms", .timeout.as_millis())]
    Timeout {
        /// Which budget fired
        phase: TimeoutPhase,
        /// The budget that was exceeded
        timeout: Duration,
    },

    /// The webhook answered with a non-2xx status.
    #[error("webhook responded with HTTP {status_code}")]
    HttpStatus {
        /// HTTP status code
        status_code: u16,
        /// Response body, truncated
        body: String,
    },

    /// Client or destination misconfiguration, e.g. an unparsable URL.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// In-flight deliveries did not finish within the shutdown budget.
    #[error("shutdown timed out after {timeout:?} with {in_flight} deliveries in flight")]
    ShutdownTimeout {
        /// Shutdown budget that was exceeded
        timeout: Duration,
        /// Deliveries still running
        in_flight: usize,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(phase: TimeoutPhase, timeout: Duration) -> Self {
        Self::Timeout { phase, timeout }
    }

    /// Creates an HTTP status error.
    pub fn http_status(status_code: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus { status_code, body: body.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// HTTP status code, if the webhook responded at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Stage of a request whose time budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Establishing the connection.
    Connect,
    /// Waiting for or reading the response.
    Request,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Request => write!(f, "request"),
        }
    }
}

/// Category of delivery error for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection and timeout failures.
    Network,
    /// Non-2xx responses.
    Http,
    /// Misconfiguration.
    Configuration,
    /// Lifecycle errors.
    Internal,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::HttpStatus { .. } => Self::Http,
            DeliveryError::ConfigurationError { .. } => Self::Configuration,
            DeliveryError::ShutdownTimeout { .. } => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Http => write!(f, "http"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_format() {
        assert_eq!(
            DeliveryError::timeout(TimeoutPhase::Request, Duration::from_secs(15)).to_string(),
            "request timeout after 15000ms"
        );
        assert_eq!(
            DeliveryError::timeout(TimeoutPhase::Connect, Duration::from_millis(250)).to_string(),
            "connect timeout after 250ms"
        );
        assert_eq!(
            DeliveryError::http_status(503, "busy").to_string(),
            "webhook responded with HTTP 503"
        );
        assert_eq!(
            DeliveryError::network("connection refused").to_string(),
            "network connection failed: connection refused"
        );
    }

    #[test]
    fn status_code_only_for_http_errors() {
        assert_eq!(DeliveryError::http_status(404, "").status_code(), Some(404));
        assert_eq!(DeliveryError::timeout(TimeoutPhase::Request, Duration::from_secs(15)).status_code(), None);
    }

    #[test]
    fn error_categories_mapped_correctly() {
        assert_eq!(ErrorCategory::from(&DeliveryError::network("x")), ErrorCategory::Network);
        assert_eq!(ErrorCategory::from(&DeliveryError::timeout(TimeoutPhase::Connect, Duration::from_secs(1))), ErrorCategory::Network);
        assert_eq!(ErrorCategory::from(&DeliveryError::http_status(500, "")), ErrorCategory::Http);
        assert_eq!(
            ErrorCategory::from(&DeliveryError::configuration("bad url")),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorCategory::Http.to_string(), "http");
    }
}
