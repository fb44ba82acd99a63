//! Index handle: document store plus derived structures.
//!
//! Handles opening, appending, querying and closing. The handle is
//! `Send + Sync`; share it through an `Arc`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use timemachine_storage::{DocumentStore, StoreOptions, StoreStats};
use timemachine_types::{Document, MessageRecord, Schema, Settings};

use crate::engine;
use crate::error::SearchError;
use crate::indexer::{IndexStats, IndexStructures, RebuildStats};
use crate::parser::QueryParser;
use crate::query::Query;
use crate::window::RecentWindow;

/// Default cap on the number of documents a query returns
pub const DEFAULT_RESULT_LIMIT: usize = 100;

/// Index configuration
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Path to the index directory
    pub index_path: PathBuf,
    /// Maximum number of documents returned per query
    pub result_limit: usize,
    /// Sync each append to disk
    pub sync_writes: bool,
}

impl IndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            result_limit: DEFAULT_RESULT_LIMIT,
            sync_writes: true,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            index_path: settings.expanded_index_path(),
            result_limit: settings.result_limit,
            sync_writes: settings.sync_writes,
        }
    }
}

/// Result of a query: the echo of what was evaluated plus the documents.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub parsed_query_description: String,
    pub results: Vec<Document>,
}

impl QueryResponse {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results as field-name keyed records.
    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        self.results.iter().map(Document::to_record).collect()
    }
}

/// Combined store and in-memory statistics
#[derive(Debug, Clone)]
pub struct TimeMachineStats {
    pub store: StoreStats,
    pub index: IndexStats,
}

struct OpenIndex {
    store: DocumentStore,
    structures: IndexStructures,
    parser: QueryParser,
}

/// An open index over chat message documents.
pub struct TimeMachineIndex {
    state: RwLock<Option<OpenIndex>>,
    schema: Schema,
    config: IndexConfig,
}

impl TimeMachineIndex {
    /// Open the index at the configured path with the message schema.
    pub fn open(config: IndexConfig) -> Result<Self, SearchError> {
        Self::open_with_schema(config, Schema::message())
    }

    /// Open or create the index, then rebuild the derived structures from
    /// the store.
    pub fn open_with_schema(config: IndexConfig, schema: Schema) -> Result<Self, SearchError> {
        let options = StoreOptions {
            sync_writes: config.sync_writes,
        };
        let store = DocumentStore::open_with_options(&config.index_path, &schema, options)?;
        let (structures, rebuild) = IndexStructures::rebuild(&store, &schema)?;

        info!(
            path = ?config.index_path,
            documents = rebuild.documents,
            elapsed_ms = rebuild.elapsed_ms,
            "Opened timemachine index"
        );

        Ok(Self {
            state: RwLock::new(Some(OpenIndex {
                store,
                structures,
                parser: QueryParser::new(schema.clone()),
            })),
            schema,
            config,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.index_path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<OpenIndex>>, SearchError> {
        self.state
            .read()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<OpenIndex>>, SearchError> {
        self.state
            .write()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))
    }

    /// Run `f` against the open state under the read lock.
    fn with_open<R>(
        &self,
        f: impl FnOnce(&OpenIndex) -> Result<R, SearchError>,
    ) -> Result<R, SearchError> {
        let guard = self.read()?;
        let open = guard.as_ref().ok_or(SearchError::Closed)?;
        f(open)
    }

    /// Append a document and make it visible to later queries.
    ///
    /// Returns the store position assigned to it. The document is checked
    /// against the schema before anything is written; `ts` is stored at
    /// microsecond resolution.
    pub fn append(&self, doc: &Document) -> Result<u64, SearchError> {
        let doc = &doc.normalized();
        IndexStructures::check(doc, &self.schema)?;

        let mut guard = self.write()?;
        let open = guard.as_mut().ok_or(SearchError::Closed)?;

        let position = open.store.append(doc)?;
        open.structures.insert(position, doc, &self.schema)?;

        debug!(position, ts = %doc.ts, "Appended message");
        Ok(position)
    }

    /// Append a message as handed over by the chat layer.
    pub fn append_record(&self, record: &MessageRecord) -> Result<u64, SearchError> {
        self.append(&Document::from_record(record))
    }

    /// Evaluate a query tree.
    pub fn evaluate(&self, query: &Query) -> Result<QueryResponse, SearchError> {
        self.with_open(|open| self.evaluate_open(open, query))
    }

    fn evaluate_open(
        &self,
        open: &OpenIndex,
        query: &Query,
    ) -> Result<QueryResponse, SearchError> {
        let results = engine::evaluate(
            query,
            &open.store,
            &open.structures,
            &self.schema,
            self.config.result_limit,
        )?;
        Ok(QueryResponse {
            parsed_query_description: query.describe(self.schema.default_field()),
            results,
        })
    }

    /// Parse and evaluate query text.
    pub fn index_query(&self, text: &str) -> Result<QueryResponse, SearchError> {
        self.with_open(|open| {
            let query = open.parser.parse(text)?;
            debug!(text, parsed = %query, "Parsed query");
            self.evaluate_open(open, &query)
        })
    }

    /// Documents with a timestamp in `[start, end]`, inclusive.
    pub fn range_query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<QueryResponse, SearchError> {
        self.evaluate(&Query::date_range(
            self.schema.timestamp_field(),
            start,
            end,
        ))
    }

    /// Documents within a recent window ending at `now`.
    pub fn recent(
        &self,
        window: RecentWindow,
        now: DateTime<Utc>,
    ) -> Result<QueryResponse, SearchError> {
        self.evaluate(&window.range(self.schema.timestamp_field(), now))
    }

    /// Discard the derived structures and rebuild them from the store.
    pub fn rebuild(&self) -> Result<RebuildStats, SearchError> {
        let mut guard = self.write()?;
        let open = guard.as_mut().ok_or(SearchError::Closed)?;

        let (structures, stats) = IndexStructures::rebuild(&open.store, &self.schema)?;
        open.structures = structures;

        info!(
            documents = stats.documents,
            elapsed_ms = stats.elapsed_ms,
            "Rebuilt timemachine index"
        );
        Ok(stats)
    }

    pub fn stats(&self) -> Result<TimeMachineStats, SearchError> {
        self.with_open(|open| {
            Ok(TimeMachineStats {
                store: open.store.stats()?,
                index: open.structures.stats(),
            })
        })
    }

    /// Number of indexed documents
    pub fn len(&self) -> Result<u64, SearchError> {
        self.with_open(|open| Ok(open.structures.len()))
    }

    pub fn is_empty(&self) -> Result<bool, SearchError> {
        self.len().map(|n| n == 0)
    }

    pub fn is_closed(&self) -> bool {
        self.read().map(|guard| guard.is_none()).unwrap_or(true)
    }

    /// Flush and release the store. Waits for in-flight operations; every
    /// later call fails with `Closed`.
    pub fn close(&self) -> Result<(), SearchError> {
        let open = self.write()?.take().ok_or(SearchError::Closed)?;
        open.store.close()?;
        info!(path = ?self.config.index_path, "Closed timemachine index");
        Ok(())
    }
}
