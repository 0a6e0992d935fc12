//! Error types for storage operations.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The space checker reported the storage as full and the write was refused.
    #[error("storage full: write to {entity} refused")]
    StorageFull {
        /// The partition the write was aimed at.
        entity: String,
    },

    /// An operation did not complete within its time budget.
    #[error("operation {operation} timed out after {after:?}")]
    Timeout {
        /// Name of the store operation.
        operation: &'static str,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// The store or provider has been closed.
    #[error("storage is closed")]
    Closed,

    /// Stored data could not be interpreted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Storage usage could not be computed.
    #[error("usage unavailable: {0}")]
    UsageUnavailable(String),

    /// A background task could not be started.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

impl StorageError {
    /// Returns true if this error signals that the storage is full.
    ///
    /// Callers use this to apply backpressure instead of failing hard.
    #[must_use]
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::StorageFull { .. })
    }

    /// Returns true if this error was raised by a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
