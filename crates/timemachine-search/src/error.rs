//! Search error types.

use thiserror::Error;

use timemachine_storage::StorageError;

/// Errors that can occur during indexing and query operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Stored schema differs from the expected one
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Store and derived structures disagree, or the store is damaged
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    /// Append rejected
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Malformed text query
    #[error("Query syntax error at position {position}: {message}")]
    QuerySyntax { position: usize, message: String },

    /// Query references a field outside the schema
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Well-formed query the engine cannot evaluate
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    /// Underlying storage unavailable
    #[error("IO failure: {0}")]
    Io(String),

    /// Index handle already closed
    #[error("Index is closed")]
    Closed,

    /// Index lock poisoned by a panicking caller
    #[error("Index is locked: {0}")]
    IndexLocked(String),
}

impl SearchError {
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        SearchError::QuerySyntax {
            position,
            message: message.into(),
        }
    }
}

impl From<StorageError> for SearchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SchemaMismatch(msg) => SearchError::SchemaMismatch(msg),
            StorageError::Corrupt(msg) => SearchError::CorruptIndex(msg),
            StorageError::Key(msg) => SearchError::CorruptIndex(format!("bad key: {}", msg)),
            StorageError::Serialization(msg) => {
                SearchError::CorruptIndex(format!("undecodable record: {}", msg))
            }
            StorageError::NotFound(position) => SearchError::CorruptIndex(format!(
                "indexed position {} missing from store",
                position
            )),
            StorageError::InvalidDocument(msg) => SearchError::InvalidDocument(msg),
            other => SearchError::Io(other.to_string()),
        }
    }
}
