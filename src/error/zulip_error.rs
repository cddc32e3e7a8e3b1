//! The crate's error type.

use std::fmt;

use thiserror::Error;

use super::category::ErrorCategory;

/// Boxed error returned by caller-supplied event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The API call an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `POST /api/v1/messages`
    SendMessage,
    /// `POST /api/v1/register`
    Register,
    /// `GET /api/v1/events`
    Poll,
    /// `DELETE /api/v1/events`
    Unregister,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SendMessage => "send_message",
            Operation::Register => "register",
            Operation::Poll => "poll",
            Operation::Unregister => "unregister",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by [`crate::ZulipClient`].
#[derive(Debug, Error)]
pub enum ZulipError {
    /// The server refused to open an event queue.
    #[error("register failed: {message}")]
    Registration {
        status: Option<u16>,
        message: String,
    },

    /// An API call was rejected: `result: error`, a 4xx status, or a
    /// non-transient transport failure.
    #[error("{operation} failed: {message}")]
    Response {
        operation: Operation,
        status: Option<u16>,
        message: String,
    },

    /// Releasing a queue the server no longer knows about.
    ///
    /// This is the normal outcome when a queue has already been garbage
    /// collected server-side. The message is the server's, verbatim.
    #[error("{message}")]
    UnknownQueue {
        queue_id: String,
        message: String,
    },

    /// 5xx or a transient transport failure.
    #[error("transient error during {operation}: {message}")]
    TransientServer {
        operation: Operation,
        status: Option<u16>,
        message: String,
    },

    /// The response body was not the JSON we expected.
    #[error("malformed response from {operation}: {message}")]
    MalformedResponse {
        operation: Operation,
        message: String,
    },

    /// The caller's event handler returned an error.
    #[error("event handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The background streaming task panicked or was aborted.
    #[error("stream task failed: {0}")]
    Task(String),
}

impl ZulipError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ZulipError::Registration { .. }
            | ZulipError::Response { .. }
            | ZulipError::UnknownQueue { .. } => ErrorCategory::Client,
            ZulipError::TransientServer { status: Some(_), .. } => ErrorCategory::Server,
            ZulipError::TransientServer { status: None, .. } => ErrorCategory::Network,
            ZulipError::MalformedResponse { .. } => ErrorCategory::Protocol,
            ZulipError::Handler(_) | ZulipError::Task(_) => ErrorCategory::Caller,
            ZulipError::Config(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether the poll loop may retry the same fetch after this error.
    pub fn is_transient(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error describes a condition the caller can safely ignore.
    ///
    /// Only an unregister of an already-gone queue qualifies.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ZulipError::UnknownQueue { .. })
    }

    /// The API call that failed, if the error came from one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            ZulipError::Registration { .. } => Some(Operation::Register),
            ZulipError::UnknownQueue { .. } => Some(Operation::Unregister),
            ZulipError::Response { operation, .. }
            | ZulipError::TransientServer { operation, .. }
            | ZulipError::MalformedResponse { operation, .. } => Some(*operation),
            ZulipError::Handler(_) | ZulipError::Config(_) | ZulipError::Task(_) => None,
        }
    }

    /// HTTP status that produced the error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ZulipError::Registration { status, .. }
            | ZulipError::Response { status, .. }
            | ZulipError::TransientServer { status, .. } => *status,
            _ => None,
        }
    }

    /// Short error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ZulipError::Registration { .. } => "E_REGISTER",
            ZulipError::Response { .. } => "E_RESPONSE",
            ZulipError::UnknownQueue { .. } => "E_UNKNOWN_QUEUE",
            ZulipError::TransientServer { .. } => "E_TRANSIENT",
            ZulipError::MalformedResponse { .. } => "E_MALFORMED",
            ZulipError::Handler(_) => "E_HANDLER",
            ZulipError::Config(_) => "E_CONFIG",
            ZulipError::Task(_) => "E_TASK",
        }
    }
}
