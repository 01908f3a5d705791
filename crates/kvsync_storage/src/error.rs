//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Every variant is fatal for the operation that produced it and is
/// surfaced to the caller; the sync engine never swallows these.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the store directory.
    #[error("store is locked by another process: {}", path.display())]
    Locked {
        /// The store directory.
        path: PathBuf,
    },

    /// The persisted table could not be decoded.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The table could not be encoded for persistence.
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The store path is unusable.
    #[error("invalid store path {}: {reason}", path.display())]
    InvalidPath {
        /// Offending path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },
}
