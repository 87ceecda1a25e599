//! Error types for storage operations

use std::fmt;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug)]
pub enum StorageError {
    /// Key or series does not exist
    NotFound(String),

    /// The underlying engine failed (disk, permissions, connection, ...)
    BackendIo(String),

    /// Malformed key, descriptor or value
    InvalidArgument(String),
}

impl StorageError {
    pub fn not_found(key: impl fmt::Display) -> Self {
        StorageError::NotFound(format!("no such key: {key}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "not found: {}", msg),
            StorageError::BackendIo(msg) => write!(f, "storage backend error: {}", msg),
            StorageError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::BackendIo(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::BackendIo(format!("storage task failed: {}", err))
    }
}

#[cfg(feature = "storage-bolt")]
impl From<jammdb::Error> for StorageError {
    fn from(err: jammdb::Error) -> Self {
        match err {
            jammdb::Error::BucketMissing | jammdb::Error::KeyValueMissing => {
                StorageError::NotFound(err.to_string())
            }
            jammdb::Error::BucketExists | jammdb::Error::IncompatibleValue => {
                StorageError::InvalidArgument(err.to_string())
            }
            _ => StorageError::BackendIo(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::BackendIo(err.to_string())
    }
}

#[cfg(feature = "storage-mongodb")]
impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::BackendIo(err.to_string())
    }
}
