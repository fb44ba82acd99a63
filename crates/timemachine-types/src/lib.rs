//! # timemachine-types
//!
//! Shared domain types for the timemachine chat history index.
//!
//! This crate defines the data structures used by every layer:
//! - Schema: the fixed, typed field set every document populates
//! - Documents: immutable records of a single chat message
//! - Message records: what the chat layer hands over at write time
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Utc;
//! use timemachine_types::{Address, Document, MessageRecord, Schema};
//!
//! let record = MessageRecord::new(
//!     Utc::now(),
//!     Address::new("alice", "example.org", "laptop"),
//!     Address::new("room", "conference.example.org", ""),
//!     "hello world",
//! );
//! let doc = Document::from_record(&record);
//! assert!(Schema::message().contains("body"));
//! assert_eq!(doc.body, "hello world");
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod schema;

pub use config::Settings;
pub use document::{Address, Document, FieldValue, MessageRecord};
pub use error::TypesError;
pub use schema::{FieldDef, FieldKind, Schema, SCHEMA_VERSION};
