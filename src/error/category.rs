//! Error category classification.
//!
//! Categories drive one decision in the poll loop: retry in place, or end
//! the session.

use std::fmt;

/// High-level categorization of errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection, timeout or read failures below HTTP.
    /// Generally transient and retryable.
    Network,

    /// Server-side errors (HTTP 5xx).
    /// Generally transient and retryable after delay.
    Server,

    /// The server rejected the request (HTTP 4xx or `result: error`).
    /// Not retryable - the same request will be rejected again.
    Client,

    /// The server answered with a body we could not decode.
    Protocol,

    /// The caller's event handler failed.
    Caller,

    /// Invalid or missing client configuration.
    Configuration,
}

impl ErrorCategory {
    /// Returns true if errors in this category are generally transient
    /// and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Server)
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Server => "server",
            ErrorCategory::Client => "client",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Caller => "caller",
            ErrorCategory::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
