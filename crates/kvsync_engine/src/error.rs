//! Error types for the sync engine.

use kvsync_protocol::ProtocolError;
use kvsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Only [`SyncError::LocalStorage`] ever reaches callers of `set`, `get`,
/// `remove` or `get_all`. Remote failures are logged and swallowed by the
/// reconciler and the publisher.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No credential, or the remote rejected it.
    #[error("not authenticated")]
    Unauthenticated,

    /// Transport-level failure reaching the remote store.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The remote answered with a non-success status.
    #[error("server error ({status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The remote body could not be decoded or encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The local store failed. Always fatal for the calling operation.
    #[error("local storage failure: {0}")]
    LocalStorage(#[from] StorageError),

    /// A manual flush was requested before reconciliation finished.
    #[error("store has not finished reconciling")]
    NotReconciled,

    /// The store was opened outside a Tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl SyncError {
    /// Creates a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the next natural trigger may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Unreachable(_) | SyncError::ServerError { .. })
    }

    /// Returns true for failures of the local store.
    pub fn is_local(&self) -> bool {
        matches!(self, SyncError::LocalStorage(_))
    }
}
