//! Error types for EdgeStore core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in EdgeStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Byte store error, including `StorageFull` and `Timeout`.
    #[error("storage error: {0}")]
    Storage(#[from] edgestore_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A key or value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `update` was called on a key that holds no value.
    #[error("value not found for key {key} in entity {entity}")]
    ValueNotFound {
        /// The entity searched.
        entity: String,
        /// Debug rendering of the missing key.
        key: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Writing the snapshot of an entity failed.
    #[error("backup of entity {entity} failed: {source}")]
    BackupFailed {
        /// The entity being written.
        entity: String,
        /// Underlying cause.
        #[source]
        source: Box<CoreError>,
    },

    /// Reading the snapshot of an entity failed.
    #[error("restore of entity {entity} failed: {source}")]
    RestoreFailed {
        /// The entity being read.
        entity: String,
        /// Underlying cause.
        #[source]
        source: Box<CoreError>,
    },

    /// The backup manifest could not be parsed or is inconsistent.
    #[error("malformed backup metadata: {message}")]
    MalformedMetadata {
        /// Description of the problem.
        message: String,
    },

    /// A snapshot file could not be encoded or decoded.
    #[error("snapshot codec error: {message}")]
    Codec {
        /// Description of the problem.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },
}

impl CoreError {
    /// Creates a value-not-found error.
    pub fn value_not_found(entity: impl Into<String>, key: impl std::fmt::Debug) -> Self {
        Self::ValueNotFound {
            entity: entity.into(),
            key: format!("{key:?}"),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps `source` as a backup failure of `entity`.
    pub fn backup_failed(entity: impl Into<String>, source: CoreError) -> Self {
        Self::BackupFailed {
            entity: entity.into(),
            source: Box::new(source),
        }
    }

    /// Wraps `source` as a restore failure of `entity`.
    pub fn restore_failed(entity: impl Into<String>, source: CoreError) -> Self {
        Self::RestoreFailed {
            entity: entity.into(),
            source: Box::new(source),
        }
    }

    /// Creates a malformed metadata error.
    pub fn malformed_metadata(message: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            message: message.into(),
        }
    }

    /// Creates a snapshot codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Returns true if a write was refused because storage is full.
    #[must_use]
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_storage_full())
    }

    /// Returns true if the operation exceeded its time budget.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgestore_storage::StorageError;
    use std::time::Duration;

    #[test]
    fn storage_full_is_detected_through_wrapping() {
        let err: CoreError = StorageError::StorageFull {
            entity: "queue".into(),
        }
        .into();
        assert!(err.is_storage_full());
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeout_is_detected_through_wrapping() {
        let err: CoreError = StorageError::Timeout {
            operation: "get",
            after: Duration::from_secs(1),
        }
        .into();
        assert!(err.is_timeout());
    }

    #[test]
    fn backup_failure_names_entity() {
        let err = CoreError::backup_failed("queueB", CoreError::codec("disk gone"));
        assert_eq!(
            err.to_string(),
            "backup of entity queueB failed: snapshot codec error: disk gone"
        );
    }
}
