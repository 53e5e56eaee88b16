//! Domain error types for access-control operations.

use thiserror::Error;

/// Coarse error classification shared by every layer.
///
/// Storage and service errors map onto one of these so callers can react to
/// the kind of failure without matching on backend-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A lookup by id or name found nothing.
    ObjectDoesNotExist,
    /// A create collided with an existing symbolic name.
    ObjectExists,
    /// Malformed input or an inconsistent request.
    InvalidParameter,
    /// Backing-store failure.
    InternalError,
}

/// Domain-specific errors for access-control operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Lookup by id or symbolic name found nothing.
    #[error("{kind} does not exist: {key}")]
    ObjectDoesNotExist { kind: &'static str, key: String },

    /// A node or user with the same symbolic name already exists.
    #[error("{kind} already exists: {name}")]
    ObjectExists { kind: &'static str, name: String },

    /// Malformed resource id, cyclic edge, inconsistent grant target, etc.
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Unexpected internal failure.
    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl DomainError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::ObjectDoesNotExist {
            kind,
            key: key.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Returns the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ObjectDoesNotExist { .. } => ErrorKind::ObjectDoesNotExist,
            Self::ObjectExists { .. } => ErrorKind::ObjectExists,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::InternalError { .. } => ErrorKind::InternalError,
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
