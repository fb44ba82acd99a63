//! Storage layer for the timemachine index.
//!
//! Provides a RocksDB-backed, append-only document store with:
//! - Column family isolation for documents and metadata
//! - Position-ordered keys for full scans in append order
//! - Atomic appends via WriteBatch (document + position counter)
//! - A persisted schema descriptor checked on every open

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{DocumentStore, StoreOptions, StoreStats};
pub use error::StorageError;
pub use keys::{DocKey, MetaKey};
