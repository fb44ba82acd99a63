//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Filesystem error outside RocksDB
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Document not found
    #[error("Document not found at position {0}")]
    NotFound(u64),

    /// Stored schema differs from the expected one
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Store structure is damaged
    #[error("Corrupt store: {0}")]
    Corrupt(String),

    /// Document rejected before writing
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
