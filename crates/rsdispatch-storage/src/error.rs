//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
///
/// A store returns these only for faults; "absent" and "not written" are
/// expressed through the `Ok` values of [`crate::SessionStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing cache could not be reached.
    #[error("session store connection error: {message}")]
    ConnectionError { message: String },

    /// Key was rejected before reaching the backend.
    #[error("invalid key: {message}")]
    InvalidKey { message: String },

    /// Payload could not be encoded or decoded.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

impl StorageError {
    /// Returns true when the error indicates the backend is unreachable.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, StorageError::ConnectionError { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
