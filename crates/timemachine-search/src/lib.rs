//! # timemachine-search
//!
//! Indexing and querying of chat message history.
//!
//! Appended messages are persisted by `timemachine-storage`; this crate
//! keeps the derived lookup structures in memory and evaluates queries
//! against them.
//!
//! ## Features
//! - Exact-match posting lists for sender/recipient address parts
//! - Inverted index over message bodies
//! - Timestamp index with inclusive range scans
//! - Boolean query language (`AND`, `OR`, `NOT`, grouping, `field:value`,
//!   `ts:[low TO high]`)
//! - Results ordered by timestamp, capped per query
//!
//! ## Usage
//!
//! ```no_run
//! use chrono::Utc;
//! use timemachine_search::{IndexConfig, TimeMachineIndex};
//! use timemachine_types::Document;
//!
//! let index = TimeMachineIndex::open(IndexConfig::new("/tmp/timemachine_index"))?;
//! index.append(&Document::new(Utc::now(), "deploy finished"))?;
//! let response = index.index_query("deploy AND ts:[2012 TO *]")?;
//! println!("{}: {} hits", response.parsed_query_description, response.len());
//! index.close()?;
//! # Ok::<(), timemachine_search::SearchError>(())
//! ```

pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod lexer;
pub mod lifecycle;
pub mod parser;
pub mod query;
pub mod timespec;
pub mod tokenizer;
pub mod window;

pub use engine::{evaluate, DocumentSource};
pub use error::SearchError;
pub use index::{IndexConfig, QueryResponse, TimeMachineIndex, TimeMachineStats};
pub use indexer::{IndexStats, IndexStructures, Posting, RebuildStats};
pub use lifecycle::{index_exists, init_or_open, shutdown};
pub use parser::QueryParser;
pub use query::Query;
pub use timespec::{parse_time_literal, TimeSpan};
pub use window::RecentWindow;
