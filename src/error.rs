//! Error types for the pluggable cache library
//!
//! This module provides a unified error handling system using `thiserror` for
//! all components of the library. Only [`StorageError`] travels through the
//! `<op>.exception` events; the other categories always reach the caller
//! directly.

use thiserror::Error;

/// The main error type for the pluggable cache library
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed, empty or pattern-mismatched key or key set
    #[error("Invalid key: {reason}")]
    InvalidKey {
        /// Why the key was refused
        reason: String,
    },

    /// Misuse of the API contract
    #[error("Logic error: {message}")]
    Logic {
        /// What was misused
        message: String,
    },

    /// Fault raised by a backend primitive or an event listener
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// The invalid setting
        message: String,
    },
}

impl Error {
    /// Build an [`Error::InvalidKey`]
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Error::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Build an [`Error::Logic`]
    pub fn logic(message: impl Into<String>) -> Self {
        Error::Logic {
            message: message.into(),
        }
    }

    /// Returns true for errors that are routed through exception events
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// Convert into a [`StorageError`] so the failure can travel through a listener
    ///
    /// Storage faults pass through unchanged; anything else becomes a
    /// [`StorageError::ListenerFailed`] naming `event`.
    pub fn into_storage_error(self, event: impl Into<String>) -> StorageError {
        match self {
            Error::Storage(error) => error,
            other => StorageError::ListenerFailed {
                event: event.into(),
                reason: other.to_string(),
            },
        }
    }
}

/// Storage-specific error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Storage backend not available
    #[error("Storage backend not available: {backend}")]
    BackendNotAvailable {
        /// Backend name
        backend: String,
    },

    /// Storage operation failed
    #[error("Storage operation failed: {operation}: {reason}")]
    OperationFailed {
        /// Backend primitive that failed
        operation: String,
        /// Failure detail
        reason: String,
    },

    /// Resource not found
    #[error("Resource not found: {resource}")]
    ResourceNotFound {
        /// Missing resource
        resource: String,
    },

    /// Storage quota exceeded
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    /// An event listener failed while handling an event
    #[error("Listener failed on {event}: {reason}")]
    ListenerFailed {
        /// Event being dispatched when the listener failed
        event: String,
        /// Failure detail
        reason: String,
    },
}

impl StorageError {
    /// Build a [`StorageError::OperationFailed`]
    pub fn operation_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::OperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience type alias for Storage Results
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let storage_error = StorageError::OperationFailed {
            operation: "set_item".to_string(),
            reason: "disk full".to_string(),
        };
        let error = Error::Storage(storage_error);
        assert!(error.to_string().contains("Storage error"));
        assert!(error.to_string().contains("disk full"));
    }

    #[test]
    fn test_invalid_key_is_not_storage() {
        let error = Error::invalid_key("An empty key isn't allowed");
        assert!(!error.is_storage());
        assert!(error.to_string().contains("Invalid key"));
    }

    #[test]
    fn test_into_storage_error() {
        let original = StorageError::QuotaExceeded;
        assert_eq!(Error::from(original.clone()).into_storage_error("setItem.post"), original);

        let wrapped = Error::logic("plugin already registered").into_storage_error("setItem.post");
        match wrapped {
            StorageError::ListenerFailed { event, reason } => {
                assert_eq!(event, "setItem.post");
                assert!(reason.contains("plugin already registered"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
