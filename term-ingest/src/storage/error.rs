use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to an object store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested object does not exist.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The call did not complete within the configured timeout.
    #[error("{operation} on '{key}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        key: String,
        after: Duration,
    },

    /// The backend rejected or failed the call.
    #[error("{operation} on '{key}' failed: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// The key cannot be represented by the backend.
    #[error("Invalid key '{key}': {message}")]
    InvalidKey { key: String, message: String },
}

impl StorageError {
    /// Returns true if this error is transient and the operation may be retried
    /// by an outer caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout { .. } | StorageError::Backend { .. }
        )
    }

    /// Returns true if the error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub(crate) fn from_object_store(
        operation: &'static str,
        key: &str,
        err: object_store::Error,
    ) -> Self {
        match err {
            object_store::Error::NotFound { .. } => StorageError::NotFound {
                key: key.to_string(),
            },
            object_store::Error::InvalidPath { source } => StorageError::InvalidKey {
                key: key.to_string(),
                message: source.to_string(),
            },
            other => StorageError::Backend {
                operation,
                key: key.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
