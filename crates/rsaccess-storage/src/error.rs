//! Storage error types.

use rsaccess_domain::{DomainError, ErrorKind};
use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Lookup, validation or consistency failure raised by the domain rules.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Transaction error.
    #[error("transaction error: {message}")]
    TransactionError { message: String },
}

impl StorageError {
    /// Classifies the error. Backend failures are all `InternalError`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(err) => err.kind(),
            Self::ConnectionError { .. }
            | Self::QueryError { .. }
            | Self::TransactionError { .. } => ErrorKind::InternalError,
        }
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
