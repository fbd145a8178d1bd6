//! Error types for the reference server.

use chatsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The narrow could not be understood.
    #[error("invalid narrow: {0}")]
    BadNarrow(String),

    /// No API key was presented, or it was malformed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API key is not valid for this realm.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Unknown endpoint.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server is temporarily unable to serve the request.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::BadNarrow(_)
                | ServerError::AuthenticationFailed(_)
                | ServerError::NotAuthorized(_)
                | ServerError::NotFound(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Unavailable(_) | ServerError::Internal(_))
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::BadNarrow(_) => 400,
            ServerError::AuthenticationFailed(_) => 401,
            ServerError::NotAuthorized(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::Unavailable(_) => 503,
            ServerError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for the error body.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "BAD_REQUEST",
            ServerError::BadNarrow(_) => "BAD_NARROW",
            ServerError::AuthenticationFailed(_) => "UNAUTHORIZED",
            ServerError::NotAuthorized(_) => "INVALID_API_KEY",
            ServerError::NotFound(_) => "NOT_FOUND",
            ServerError::Unavailable(_) => "UNAVAILABLE",
            ServerError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidNarrow(_) | ProtocolError::UnsupportedTerm { .. } => {
                ServerError::BadNarrow(err.to_string())
            }
            _ => ServerError::InvalidRequest(err.to_string()),
        }
    }
}
