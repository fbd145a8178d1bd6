//! Error types for protocol parsing.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A server version string could not be parsed.
    #[error("invalid server version '{0}'")]
    InvalidVersion(String),

    /// A textual narrow could not be parsed.
    #[error("invalid narrow '{0}'")]
    InvalidNarrow(String),

    /// A textual anchor could not be parsed.
    #[error("invalid anchor '{0}'")]
    InvalidAnchor(String),

    /// A wire narrow term had an unknown operator or a malformed operand.
    #[error("unsupported narrow term {operator}:{operand}")]
    UnsupportedTerm {
        /// Term operator.
        operator: String,
        /// Term operand, rendered as JSON.
        operand: String,
    },
}
