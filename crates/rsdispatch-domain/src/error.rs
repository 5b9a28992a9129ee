//! Domain error types.

use thiserror::Error;

/// Domain-specific errors raised while building or restoring domain values.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A permission map could not be decoded.
    #[error("invalid permissions map: {message}")]
    InvalidPermissions { message: String },

    /// A session map could not be decoded.
    #[error("invalid session map: {message}")]
    InvalidSession { message: String },

    /// A resource descriptor declaration is inconsistent.
    #[error("invalid resource descriptor '{resource}': {message}")]
    InvalidDescriptor { resource: String, message: String },

    /// An action name outside list/show/create/update/delete.
    #[error("unknown action: {value}")]
    UnknownAction { value: String },

    /// A verdict name outside allow/deny/ask.
    #[error("unknown verdict: {value}")]
    UnknownVerdict { value: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
