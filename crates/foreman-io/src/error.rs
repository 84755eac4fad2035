//! Error types for IO capture.

use thiserror::Error;

/// Errors that can occur while capturing process IO.
#[derive(Debug, Error)]
pub enum IoError {
    /// A lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// I/O error from an underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for IO capture operations.
pub type Result<T> = std::result::Result<T, IoError>;
