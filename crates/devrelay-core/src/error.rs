// Error type shared across the relay.
//
// Each variant corresponds to one failure class the HTTP layer knows how to
// map to a status code. Validation always fails before any store access.

use serde::Serialize;

/// Unified error for relay operations.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayError {
    /// Missing or malformed required fields.
    #[error("{0}")]
    Validation(String),

    /// A referenced key does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Unique-constraint violation (duplicate key).
    #[error("{0}")]
    Conflict(String),

    /// Device-id generation could not find a unique candidate.
    #[error("could not allocate a unique device id")]
    ExhaustedRetries,

    /// Mailbox was already consumed and not rewritten since.
    #[error("unable to fetch, already fetched")]
    AlreadyFetched,

    /// Missing or invalid admin credential.
    #[error("{0}")]
    Unauthorized(String),

    /// Failure inside a transactional scope; all writes were rolled back.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// Uncaught store/driver error.
    #[error("{0}")]
    Internal(String),
}

impl RelayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Unified result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
