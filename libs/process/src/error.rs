//! Error types shared by all runner backends.

use thiserror::Error;

/// Classification of an [`ExecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The target (container, process) does not exist (anymore).
    NotFound,

    /// The backend could not be reached or was busy; retrying may succeed.
    Transient,

    /// Any other failure.
    Fatal,
}

/// Errors returned by runners and process handles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A retryable failure talking to the backend.
    #[error("transient error: {0}")]
    Transient(String),

    /// A permanent failure.
    #[error("{0}")]
    Fatal(String),
}

impl ExecError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::NotFound(_) => ErrorKind::NotFound,
            ExecError::Transient(_) => ErrorKind::Transient,
            ExecError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if the target no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecError::NotFound(_))
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Transient(_))
    }

    /// The error message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ExecError::NotFound(m) | ExecError::Transient(m) | ExecError::Fatal(m) => m,
        }
    }
}
