//! Error types for the sync engine.

use chatsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller or credential fault (4xx). Never retried.
    Client,
    /// Transient server fault (5xx). Retried with backoff.
    Server,
    /// The absolute deadline elapsed.
    Timeout,
    /// Anything else. Never retried.
    Unclassified,
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The server rejected the request (4xx).
    #[error("client error {status} ({code}): {message}")]
    Client {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error code from the server.
        code: String,
        /// Error message from the server.
        message: String,
    },

    /// The server failed to handle the request (5xx).
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the server.
        message: String,
    },

    /// The absolute deadline elapsed.
    #[error("operation timed out")]
    Timeout,

    /// The operation was cancelled after its deadline fired or on shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// A response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Builds an error from a non-success HTTP status.
    pub fn from_status(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        match status {
            400..=499 => SyncError::Client {
                status,
                code: code.into(),
                message: message.into(),
            },
            500..=599 => SyncError::Server {
                status,
                message: message.into(),
            },
            _ => SyncError::Protocol(format!(
                "unexpected status {status}: {}",
                message.into()
            )),
        }
    }

    /// Classifies the error for retry and recovery decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Client { .. } => ErrorClass::Client,
            SyncError::Server { .. } => ErrorClass::Server,
            SyncError::Timeout => ErrorClass::Timeout,
            _ => ErrorClass::Unclassified,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Server
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
