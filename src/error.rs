//! Error types for the Tsumugi library.
//!
//! All failures are represented by the [`TsumugiError`] enum. Faults are
//! never retried or swallowed inside the core: they propagate unchanged to
//! the caller (the surrounding distributed-job framework), which owns
//! task-level retry. Once an operation reports a fault, the instance that
//! produced it must be discarded, not reused.

use std::io;

use thiserror::Error;

/// The main error type for Tsumugi operations.
#[derive(Error, Debug)]
pub enum TsumugiError {
    /// I/O errors from the underlying storage streams.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage-related errors (missing files, write-once violations, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Index-related errors (malformed segment data, bad state transitions)
    #[error("Index error: {0}")]
    Index(String),

    /// Analysis-related errors (tokenization, filtering)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// A foreign store could not be opened or read during a form merge
    #[error("Merge error: {0}")]
    Merge(String),

    /// Wire-format errors while serializing or deserializing a form
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid operation for the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with TsumugiError.
pub type Result<T> = std::result::Result<T, TsumugiError>;

impl TsumugiError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TsumugiError::Storage(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        TsumugiError::Index(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        TsumugiError::Analysis(msg.into())
    }

    /// Create a new merge error.
    pub fn merge<S: Into<String>>(msg: S) -> Self {
        TsumugiError::Merge(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        TsumugiError::Serialization(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        TsumugiError::InvalidOperation(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TsumugiError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TsumugiError::storage("missing file");
        assert_eq!(error.to_string(), "Storage error: missing file");

        let error = TsumugiError::merge("foreign store unreadable");
        assert_eq!(error.to_string(), "Merge error: foreign store unreadable");

        let error = TsumugiError::invalid_operation("writer is closed");
        assert_eq!(error.to_string(), "Invalid operation: writer is closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error = TsumugiError::from(io_error);

        match error {
            TsumugiError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
