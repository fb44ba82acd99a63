//! RocksDB wrapper for the document store.
//!
//! Provides:
//! - Store open/create with schema persistence and validation
//! - Atomic appends (document + position counter in one WriteBatch)
//! - Random-access fetch by position
//! - Ordered full scans for index rebuilds

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use tracing::{debug, info, warn};

use timemachine_types::{Document, Schema};

use crate::column_families::{build_cf_descriptors, ALL_CF_NAMES, CF_DOCUMENTS, CF_META};
use crate::error::StorageError;
use crate::keys::{decode_position, encode_position, DocKey, MetaKey};

/// Store tuning options
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// fsync the WAL on every append
    pub sync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { sync_writes: true }
    }
}

/// Store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub documents: u64,
    pub estimated_keys: u64,
    pub live_data_bytes: u64,
}

/// Append-only document store
///
/// Documents are addressed by the position assigned at append time. The
/// position counter is guarded by a mutex so appends are serialized.
pub struct DocumentStore {
    db: DB,
    schema: Schema,
    path: PathBuf,
    options: StoreOptions,
    next_position: Mutex<u64>,
}

impl DocumentStore {
    /// Open the store at `path`, creating it with `schema` if absent.
    pub fn open(path: &Path, schema: &Schema) -> Result<Self, StorageError> {
        Self::open_with_options(path, schema, StoreOptions::default())
    }

    pub fn open_with_options(
        path: &Path,
        schema: &Schema,
        options: StoreOptions,
    ) -> Result<Self, StorageError> {
        let existing = Self::exists(path);
        if !existing {
            std::fs::create_dir_all(path)?;
        }

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_compaction_style(rocksdb::DBCompactionStyle::Universal);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;

        if existing {
            Self::check_schema(&db, schema)?;
            debug!(path = ?path, "Opened existing document store");
        } else {
            Self::write_schema(&db, schema)?;
            info!(path = ?path, "Created new document store");
        }

        let next_position = Self::reconcile_next_position(&db)?;

        info!(path = ?path, documents = next_position, "Opened document store");

        Ok(Self {
            db,
            schema: schema.clone(),
            path: path.to_path_buf(),
            options,
            next_position: Mutex::new(next_position),
        })
    }

    /// Whether a store already exists at `path`.
    pub fn exists(path: &Path) -> bool {
        path.join("CURRENT").exists()
    }

    fn cf_of<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily, StorageError> {
        db.cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        Self::cf_of(&self.db, name)
    }

    fn write_schema(db: &DB, schema: &Schema) -> Result<(), StorageError> {
        let meta_cf = Self::cf_of(db, CF_META)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(meta_cf, MetaKey::Schema.as_bytes(), schema.to_bytes()?);
        batch.put_cf(meta_cf, MetaKey::NextPosition.as_bytes(), encode_position(0));
        db.write(batch)?;
        Ok(())
    }

    fn check_schema(db: &DB, expected: &Schema) -> Result<(), StorageError> {
        let meta_cf = Self::cf_of(db, CF_META)?;

        let bytes = db
            .get_cf(meta_cf, MetaKey::Schema.as_bytes())?
            .ok_or_else(|| StorageError::Corrupt("missing schema descriptor".to_string()))?;
        let stored = Schema::from_bytes(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("unreadable schema descriptor: {}", e)))?;

        if stored != *expected {
            return Err(StorageError::SchemaMismatch(format!(
                "stored v{} [{}] (default {}), expected v{} [{}] (default {})",
                stored.version(),
                describe_fields(&stored),
                stored.default_field(),
                expected.version(),
                describe_fields(expected),
                expected.default_field(),
            )));
        }
        Ok(())
    }

    /// Derive the next position from the documents themselves and repair
    /// the persisted counter if it disagrees.
    fn reconcile_next_position(db: &DB) -> Result<u64, StorageError> {
        let docs_cf = Self::cf_of(db, CF_DOCUMENTS)?;
        let meta_cf = Self::cf_of(db, CF_META)?;

        let mut iter = db.iterator_cf(docs_cf, IteratorMode::End);
        let derived = match iter.next() {
            Some(result) => {
                let (key, _) = result?;
                DocKey::from_bytes(&key)?.position + 1
            }
            None => 0,
        };

        let recorded = db
            .get_cf(meta_cf, MetaKey::NextPosition.as_bytes())?
            .map(|b| decode_position(&b))
            .transpose()?;

        if recorded != Some(derived) {
            warn!(
                recorded = ?recorded,
                derived,
                "Position counter disagrees with stored documents, repairing"
            );
            db.put_cf(
                meta_cf,
                MetaKey::NextPosition.as_bytes(),
                encode_position(derived),
            )?;
        }

        Ok(derived)
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.options.sync_writes);
        opts
    }

    /// Schema this store was opened with
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that a document can be stored.
    pub fn validate(&self, doc: &Document) -> Result<(), StorageError> {
        if !doc.has_body() {
            return Err(StorageError::InvalidDocument("empty body".to_string()));
        }
        if let Some(missing) = self
            .schema
            .fields()
            .iter()
            .find(|f| doc.field_value(&f.name).is_none())
        {
            return Err(StorageError::InvalidDocument(format!(
                "no value for schema field {}",
                missing.name
            )));
        }
        Ok(())
    }

    /// Append a document, returning its position.
    ///
    /// The document and the advanced position counter are written in one
    /// batch: either both land or neither does.
    pub fn append(&self, doc: &Document) -> Result<u64, StorageError> {
        let doc = &doc.normalized();
        self.validate(doc)?;

        let docs_cf = self.cf(CF_DOCUMENTS)?;
        let meta_cf = self.cf(CF_META)?;
        let doc_bytes = doc.to_bytes()?;

        let mut next = self
            .next_position
            .lock()
            .map_err(|e| StorageError::Corrupt(format!("position counter poisoned: {}", e)))?;
        let position = *next;

        let mut batch = WriteBatch::default();
        batch.put_cf(docs_cf, DocKey::new(position).to_bytes(), &doc_bytes);
        batch.put_cf(
            meta_cf,
            MetaKey::NextPosition.as_bytes(),
            encode_position(position + 1),
        );
        self.db.write_opt(batch, &self.write_options())?;

        *next = position + 1;
        debug!(position, bytes = doc_bytes.len(), "Appended document");
        Ok(position)
    }

    /// Get a single document by position
    pub fn get(&self, position: u64) -> Result<Option<Document>, StorageError> {
        let docs_cf = self.cf(CF_DOCUMENTS)?;

        match self.db.get_cf(docs_cf, DocKey::new(position).to_bytes())? {
            Some(bytes) => Ok(Some(Document::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch documents in the order of `positions`.
    ///
    /// Fails with `NotFound` on the first position that is not stored.
    pub fn fetch(&self, positions: &[u64]) -> Result<Vec<Document>, StorageError> {
        let mut docs = Vec::with_capacity(positions.len());
        for &position in positions {
            let doc = self.get(position)?.ok_or(StorageError::NotFound(position))?;
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Visit every document in position order.
    ///
    /// Returns the number of documents visited.
    pub fn visit<F, E>(&self, mut f: F) -> Result<u64, E>
    where
        F: FnMut(u64, Document) -> Result<(), E>,
        E: From<StorageError>,
    {
        let docs_cf = self.cf(CF_DOCUMENTS)?;

        let mut count = 0;
        for item in self.db.iterator_cf(docs_cf, IteratorMode::Start) {
            let (key, value) = item.map_err(StorageError::from)?;
            let position = DocKey::from_bytes(&key)?.position;
            let doc = Document::from_bytes(&value).map_err(|e| {
                StorageError::Corrupt(format!("undecodable document at {}: {}", position, e))
            })?;
            f(position, doc)?;
            count += 1;
        }
        Ok(count)
    }

    /// Number of documents appended so far
    pub fn len(&self) -> u64 {
        self.next_position.lock().map(|n| *n).unwrap_or_else(|e| *e.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let docs_cf = self.cf(CF_DOCUMENTS)?;
        let estimated_keys = self
            .db
            .property_int_value_cf(docs_cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        let live_data_bytes = self
            .db
            .property_int_value_cf(docs_cf, "rocksdb.estimate-live-data-size")?
            .unwrap_or(0);

        Ok(StoreStats {
            documents: self.len(),
            estimated_keys,
            live_data_bytes,
        })
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Flush and release the database.
    pub fn close(self) -> Result<(), StorageError> {
        self.flush()?;
        info!(path = ?self.path, documents = self.len(), "Closed document store");
        Ok(())
    }
}

fn describe_fields(schema: &Schema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| format!("{}:{}", f.name, f.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;
    use timemachine_types::{Address, FieldDef, FieldKind};

    fn sample_doc(i: i64, body: &str) -> Document {
        let base = Utc.with_ymd_and_hms(2024, 1, 29, 12, 0, 0).unwrap();
        Document::new(base + Duration::minutes(i), body)
            .with_from(&Address::new("alice", "example.org", "laptop"))
            .with_to(&Address::new("ops", "conference.example.org", ""))
    }

    fn fast_options() -> StoreOptions {
        StoreOptions { sync_writes: false }
    }

    #[test]
    fn test_create_new_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index");

        assert!(!DocumentStore::exists(&path));
        let store = DocumentStore::open_with_options(&path, &Schema::message(), fast_options())
            .unwrap();
        assert!(DocumentStore::exists(&path));
        assert!(store.is_empty());
        assert_eq!(store.schema(), &Schema::message());
    }

    #[test]
    fn test_append_and_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();

        let p0 = store.append(&sample_doc(0, "first")).unwrap();
        let p1 = store.append(&sample_doc(1, "second")).unwrap();
        assert_eq!((p0, p1), (0, 1));
        assert_eq!(store.len(), 2);

        let docs = store.fetch(&[1, 0]).unwrap();
        assert_eq!(docs[0].body, "second");
        assert_eq!(docs[1].body, "first");
        assert_eq!(docs[0], sample_doc(1, "second"));
    }

    #[test]
    fn test_fetch_missing_position() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();
        store.append(&sample_doc(0, "only")).unwrap();

        assert!(matches!(store.fetch(&[0, 7]), Err(StorageError::NotFound(7))));
        assert!(store.get(7).unwrap().is_none());
    }

    #[test]
    fn test_empty_body_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();

        let result = store.append(&sample_doc(0, ""));
        assert!(matches!(result, Err(StorageError::InvalidDocument(_))));
        let result = store.append(&sample_doc(0, "   "));
        assert!(matches!(result, Err(StorageError::InvalidDocument(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reopen_keeps_documents() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = DocumentStore::open_with_options(
                temp_dir.path(),
                &Schema::message(),
                fast_options(),
            )
            .unwrap();
            for i in 0..5 {
                store.append(&sample_doc(i, &format!("message {}", i))).unwrap();
            }
            store.close().unwrap();
        }

        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();
        assert_eq!(store.len(), 5);
        assert_eq!(store.append(&sample_doc(5, "after reopen")).unwrap(), 5);
    }

    #[test]
    fn test_schema_mismatch_on_open() {
        let temp_dir = TempDir::new().unwrap();
        DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
            .unwrap()
            .close()
            .unwrap();

        let other = Schema::new(
            vec![
                FieldDef::new("ts", FieldKind::Timestamp),
                FieldDef::new("body", FieldKind::Text),
            ],
            "body",
        )
        .unwrap();

        let result = DocumentStore::open_with_options(temp_dir.path(), &other, fast_options());
        assert!(matches!(result, Err(StorageError::SchemaMismatch(_))));
    }

    #[test]
    fn test_visit_in_position_order() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();
        // More than ten so that unpadded keys would sort wrongly
        for i in 0..12 {
            store.append(&sample_doc(i, &format!("m{}", i))).unwrap();
        }

        let mut seen = Vec::new();
        let count = store
            .visit(|position, doc| {
                seen.push((position, doc.body));
                Ok::<(), StorageError>(())
            })
            .unwrap();

        assert_eq!(count, 12);
        for (i, (position, body)) in seen.iter().enumerate() {
            assert_eq!(*position, i as u64);
            assert_eq!(body, &format!("m{}", i));
        }
    }

    #[test]
    fn test_counter_repaired_from_documents() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = DocumentStore::open_with_options(
                temp_dir.path(),
                &Schema::message(),
                fast_options(),
            )
            .unwrap();
            store.append(&sample_doc(0, "a")).unwrap();
            store.append(&sample_doc(1, "b")).unwrap();

            // Simulate a stale counter
            let meta_cf = store.cf(CF_META).unwrap();
            store
                .db
                .put_cf(meta_cf, MetaKey::NextPosition.as_bytes(), encode_position(0))
                .unwrap();
            store.close().unwrap();
        }

        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.append(&sample_doc(2, "c")).unwrap(), 2);
    }

    #[test]
    fn test_undecodable_document_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();
        store.append(&sample_doc(0, "fine")).unwrap();
        store.append(&sample_doc(1, "damaged")).unwrap();

        let docs_cf = store.cf(CF_DOCUMENTS).unwrap();
        store
            .db
            .put_cf(docs_cf, DocKey::new(1).to_bytes(), b"{not json")
            .unwrap();

        let result = store.visit(|_, _| Ok::<(), StorageError>(()));
        assert!(matches!(result, Err(StorageError::Corrupt(msg)) if msg.contains("at 1")));
    }

    #[test]
    fn test_missing_schema_descriptor_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = DocumentStore::open_with_options(
                temp_dir.path(),
                &Schema::message(),
                fast_options(),
            )
            .unwrap();
            let meta_cf = store.cf(CF_META).unwrap();
            store.db.delete_cf(meta_cf, MetaKey::Schema.as_bytes()).unwrap();
            store.close().unwrap();
        }

        let result =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options());
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_unreadable_schema_descriptor_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = DocumentStore::open_with_options(
                temp_dir.path(),
                &Schema::message(),
                fast_options(),
            )
            .unwrap();
            let meta_cf = store.cf(CF_META).unwrap();
            store
                .db
                .put_cf(meta_cf, MetaKey::Schema.as_bytes(), b"\xff\x00")
                .unwrap();
            store.close().unwrap();
        }

        let result =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options());
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_stats() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            DocumentStore::open_with_options(temp_dir.path(), &Schema::message(), fast_options())
                .unwrap();
        store.append(&sample_doc(0, "a")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.documents, 1);
    }
}
