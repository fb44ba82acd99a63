//! Derived lookup structures built from appended documents.
//!
//! Three kinds of structure are maintained incrementally:
//! - exact-match posting lists for identifier fields (value -> positions)
//! - an inverted index for text fields (token -> positions + term frequency)
//! - a timestamp index ordered by (timestamp, position) for range scans
//!
//! Everything here is rebuildable from the document store; positions are
//! back-references into the store, never owned documents.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use tracing::{debug, info};

use timemachine_storage::DocumentStore;
use timemachine_types::{Document, FieldKind, FieldValue, Schema};

use crate::error::SearchError;
use crate::tokenizer::term_frequencies;

/// One entry of an inverted-index posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub position: u64,
    /// Occurrences of the token in the document; kept for future ranking.
    pub term_freq: u32,
}

/// Counters describing the in-memory structures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: u64,
    pub distinct_values: u64,
    pub distinct_tokens: u64,
    pub postings: u64,
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Default)]
pub struct RebuildStats {
    pub documents: u64,
    pub elapsed_ms: u64,
}

/// Values extracted from one document, checked before any structure is touched.
struct Extracted<'a> {
    timestamp: i64,
    exact: Vec<(&'a str, &'a str)>,
    text: Vec<(&'a str, Vec<(String, u32)>)>,
}

/// In-memory posting lists, inverted index and timestamp index.
#[derive(Debug, Clone, Default)]
pub struct IndexStructures {
    /// field -> value -> sorted positions
    exact: HashMap<String, HashMap<String, Vec<u64>>>,
    /// field -> token -> postings sorted by position
    text: HashMap<String, HashMap<String, Vec<Posting>>>,
    /// (timestamp micros, position)
    timestamps: BTreeSet<(i64, u64)>,
    ts_by_position: HashMap<u64, i64>,
    positions: BTreeSet<u64>,
}

impl IndexStructures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild all structures by scanning the store from position 0.
    pub fn rebuild(
        store: &DocumentStore,
        schema: &Schema,
    ) -> Result<(Self, RebuildStats), SearchError> {
        let started = Instant::now();
        let mut structures = Self::new();

        let documents = store.visit(|position, doc| structures.insert(position, &doc, schema))?;

        let stats = RebuildStats {
            documents,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            documents = stats.documents,
            elapsed_ms = stats.elapsed_ms,
            "Rebuilt index structures"
        );
        Ok((structures, stats))
    }

    fn extract<'a>(doc: &'a Document, schema: &'a Schema) -> Result<Extracted<'a>, SearchError> {
        let mut timestamp = None;
        let mut exact = Vec::new();
        let mut text = Vec::new();

        for field in schema.fields() {
            let value = doc.field_value(&field.name).ok_or_else(|| {
                SearchError::InvalidDocument(format!("no value for field {}", field.name))
            })?;

            match (field.kind, value) {
                (FieldKind::Timestamp, FieldValue::Timestamp(ts)) => {
                    timestamp = Some(ts.timestamp_micros())
                }
                (FieldKind::Identifier, FieldValue::Str(s)) => exact.push((field.name.as_str(), s)),
                (FieldKind::Text, FieldValue::Str(s)) => {
                    text.push((field.name.as_str(), term_frequencies(s)))
                }
                (kind, _) => {
                    return Err(SearchError::InvalidDocument(format!(
                        "value of field {} is not a {}",
                        field.name, kind
                    )))
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            SearchError::InvalidDocument("schema has no timestamp field".to_string())
        })?;

        Ok(Extracted {
            timestamp,
            exact,
            text,
        })
    }

    /// Check that `doc` is indexable under `schema` without indexing it.
    pub fn check(doc: &Document, schema: &Schema) -> Result<(), SearchError> {
        Self::extract(doc, schema).map(|_| ())
    }

    /// Index a document at `position`.
    ///
    /// The document is fully validated first; on error nothing is changed.
    pub fn insert(
        &mut self,
        position: u64,
        doc: &Document,
        schema: &Schema,
    ) -> Result<(), SearchError> {
        if self.positions.contains(&position) {
            return Err(SearchError::CorruptIndex(format!(
                "position {} indexed twice",
                position
            )));
        }

        let extracted = Self::extract(doc, schema)?;

        for (field, value) in extracted.exact {
            let list = self
                .exact
                .entry(field.to_string())
                .or_default()
                .entry(value.to_string())
                .or_default();
            insert_sorted(list, position, |p| *p);
        }

        for (field, freqs) in extracted.text {
            let index = self.text.entry(field.to_string()).or_default();
            for (token, term_freq) in freqs {
                let list = index.entry(token).or_default();
                insert_sorted(list, Posting { position, term_freq }, |p| p.position);
            }
        }

        self.timestamps.insert((extracted.timestamp, position));
        self.ts_by_position.insert(position, extracted.timestamp);
        self.positions.insert(position);

        debug!(position, "Indexed document");
        Ok(())
    }

    /// Positions whose identifier `field` equals `value` exactly.
    pub fn lookup_exact(&self, field: &str, value: &str) -> &[u64] {
        self.exact
            .get(field)
            .and_then(|values| values.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Postings of a normalized token in text `field`.
    pub fn lookup_token(&self, field: &str, token: &str) -> &[Posting] {
        self.text
            .get(field)
            .and_then(|tokens| tokens.get(token))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Occurrences of `token` in the document at `position`.
    pub fn term_frequency(&self, field: &str, token: &str, position: u64) -> Option<u32> {
        let postings = self.lookup_token(field, token);
        postings
            .binary_search_by_key(&position, |p| p.position)
            .ok()
            .map(|i| postings[i].term_freq)
    }

    /// Positions with a timestamp in `[low, high]` (microseconds, inclusive),
    /// in timestamp order. `None` leaves that side open.
    pub fn range(&self, low: Option<i64>, high: Option<i64>) -> Vec<u64> {
        let low = low.unwrap_or(i64::MIN);
        let high = high.unwrap_or(i64::MAX);
        if low > high {
            return Vec::new();
        }
        self.timestamps
            .range((low, 0)..=(high, u64::MAX))
            .map(|&(_, position)| position)
            .collect()
    }

    pub fn timestamp_of(&self, position: u64) -> Option<i64> {
        self.ts_by_position.get(&position).copied()
    }

    /// Every indexed position; the universe for negation.
    pub fn all_positions(&self) -> &BTreeSet<u64> {
        &self.positions
    }

    pub fn contains(&self, position: u64) -> bool {
        self.positions.contains(&position)
    }

    pub fn len(&self) -> u64 {
        self.positions.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        let distinct_values = self.exact.values().map(|v| v.len() as u64).sum();
        let distinct_tokens = self.text.values().map(|t| t.len() as u64).sum();
        let postings = self
            .exact
            .values()
            .flat_map(|v| v.values())
            .map(|l| l.len() as u64)
            .sum::<u64>()
            + self
                .text
                .values()
                .flat_map(|t| t.values())
                .map(|l| l.len() as u64)
                .sum::<u64>();

        IndexStats {
            documents: self.len(),
            distinct_values,
            distinct_tokens,
            postings,
        }
    }
}

/// Keep `list` sorted by key; appends are the common case.
fn insert_sorted<T, F>(list: &mut Vec<T>, item: T, key: F)
where
    F: Fn(&T) -> u64,
{
    let k = key(&item);
    match list.last() {
        Some(last) if key(last) >= k => {
            let idx = list.partition_point(|x| key(x) < k);
            list.insert(idx, item);
        }
        _ => list.push(item),
    }
}
