//! Error handling for selective storage downloads
//!
//! This module defines the error types used throughout the library.
//! File-level failures are recorded in the progress ledger; the variants
//! here are what the public operations return to their callers.

use crate::types::CidError;
use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error types that can occur when downloading from a content store
#[derive(Error, Debug)]
pub enum StorageError {
    /// A content identifier could not be resolved
    #[error("Failed to resolve {cid}: {message}")]
    Resolution { cid: String, message: String },

    /// A directory could not be enumerated
    #[error("Failed to list directory {cid}: {message}")]
    Listing { cid: String, message: String },

    /// The content stream broke off mid-transfer
    #[error("Failed to copy content to {path}: {message}")]
    Copy { path: String, message: String },

    /// Session lifecycle misuse
    #[error("Session operation failed: {operation} - {message}")]
    Session { operation: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid parameter
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// No ledger entry exists for the id
    #[error("Download ID {id} not found or already cleaned up")]
    NotFound { id: String },

    /// Operation timed out
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Operation was cancelled
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// Malformed content identifier
    #[error("Invalid CID: {0}")]
    InvalidCid(#[from] CidError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A spawned unit of work panicked or was aborted
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl StorageError {
    /// Create a new resolution error
    pub fn resolution_error(cid: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Resolution {
            cid: cid.into(),
            message: message.into(),
        }
    }

    /// Create a new listing error
    pub fn listing_error(cid: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Listing {
            cid: cid.into(),
            message: message.into(),
        }
    }

    /// Create a new copy error
    pub fn copy_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Copy {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new session error
    pub fn session_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Session {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        StorageError::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        StorageError::NotFound { id: id.into() }
    }

    /// Create a new timeout error
    pub fn timeout(operation: impl Into<String>) -> Self {
        StorageError::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a new cancelled error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        StorageError::Cancelled {
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StorageError::resolution_error("zabc", "no such block");
        assert!(matches!(err, StorageError::Resolution { .. }));

        let err = StorageError::session_error("start", "already started");
        assert!(matches!(err, StorageError::Session { .. }));

        let err = StorageError::copy_error("/tmp/x", "stream reset");
        assert!(matches!(err, StorageError::Copy { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::listing_error("zdir", "peer went away");
        assert_eq!(
            err.to_string(),
            "Failed to list directory zdir: peer went away"
        );

        let err = StorageError::not_found("task_1:a/x.txt");
        assert_eq!(
            err.to_string(),
            "Download ID task_1:a/x.txt not found or already cleaned up"
        );

        let err = StorageError::session_error("start", "Session is already started");
        assert_eq!(
            err.to_string(),
            "Session operation failed: start - Session is already started"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io.into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
