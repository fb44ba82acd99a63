//! Query evaluation.
//!
//! A query is validated as a whole, evaluated against the derived
//! structures to a set of positions, ordered by (timestamp, position),
//! capped, and only then materialized from the document source.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use timemachine_storage::DocumentStore;
use timemachine_types::{Document, FieldKind, Schema};

use crate::error::SearchError;
use crate::indexer::IndexStructures;
use crate::query::Query;
use crate::timespec::parse_time_literal;
use crate::tokenizer::tokenize;

/// Random access to stored documents by position.
pub trait DocumentSource {
    /// Documents in the order of `positions`.
    fn fetch(&self, positions: &[u64]) -> Result<Vec<Document>, SearchError>;
}

impl DocumentSource for DocumentStore {
    fn fetch(&self, positions: &[u64]) -> Result<Vec<Document>, SearchError> {
        Ok(DocumentStore::fetch(self, positions)?)
    }
}

/// Evaluate `query` and return at most `limit` documents, earliest first.
pub fn evaluate<S: DocumentSource + ?Sized>(
    query: &Query,
    source: &S,
    structures: &IndexStructures,
    schema: &Schema,
    limit: usize,
) -> Result<Vec<Document>, SearchError> {
    let matches = matching_positions(query, structures, schema)?;
    let total = matches.len();
    let positions = order_and_cap(matches, structures, limit)?;

    let documents = source.fetch(&positions)?;
    if documents.len() != positions.len() {
        return Err(SearchError::CorruptIndex(format!(
            "requested {} documents, store returned {}",
            positions.len(),
            documents.len()
        )));
    }

    debug!(total, returned = documents.len(), "Evaluated query");
    Ok(documents)
}

/// Validate and evaluate `query` to the full set of matching positions.
pub fn matching_positions(
    query: &Query,
    structures: &IndexStructures,
    schema: &Schema,
) -> Result<BTreeSet<u64>, SearchError> {
    validate(query, schema)?;
    Ok(Evaluator { structures, schema }.eval(query))
}

/// Sort positions by (timestamp, position) and keep the first `limit`.
pub fn order_and_cap(
    positions: BTreeSet<u64>,
    structures: &IndexStructures,
    limit: usize,
) -> Result<Vec<u64>, SearchError> {
    let mut keyed = positions
        .into_iter()
        .map(|position| {
            structures
                .timestamp_of(position)
                .map(|ts| (ts, position))
                .ok_or_else(|| {
                    SearchError::CorruptIndex(format!("no timestamp for position {}", position))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    keyed.sort_unstable();
    keyed.truncate(limit);
    Ok(keyed.into_iter().map(|(_, position)| position).collect())
}

/// Check every field reference and literal before any structure is read.
pub fn validate(query: &Query, schema: &Schema) -> Result<(), SearchError> {
    match query {
        Query::Term { field, value } => {
            let kind = field_kind(schema, field)?;
            if kind == FieldKind::Timestamp && parse_time_literal(value).is_none() {
                return Err(SearchError::UnsupportedQuery(format!(
                    "invalid timestamp '{}' for field '{}'",
                    value, field
                )));
            }
            Ok(())
        }
        Query::BareTerm(_) => field_kind(schema, schema.default_field()).map(|_| ()),
        Query::Range { field, .. } => match field_kind(schema, field)? {
            FieldKind::Timestamp => Ok(()),
            kind => Err(SearchError::UnsupportedQuery(format!(
                "range on {} field '{}'",
                kind, field
            ))),
        },
        Query::And(left, right) | Query::Or(left, right) => {
            validate(left, schema)?;
            validate(right, schema)
        }
        Query::Not(inner) => validate(inner, schema),
    }
}

/// Microseconds of `ts`, rounded up so a low bound never admits an
/// earlier stored timestamp.
fn ceil_micros(ts: DateTime<Utc>) -> i64 {
    let micros = ts.timestamp_micros();
    if ts.timestamp_subsec_nanos() % 1_000 == 0 {
        micros
    } else {
        micros + 1
    }
}

fn field_kind(schema: &Schema, field: &str) -> Result<FieldKind, SearchError> {
    schema
        .kind_of(field)
        .ok_or_else(|| SearchError::UnknownField(field.to_string()))
}

struct Evaluator<'a> {
    structures: &'a IndexStructures,
    schema: &'a Schema,
}

impl Evaluator<'_> {
    /// Only called on validated queries.
    fn eval(&self, query: &Query) -> BTreeSet<u64> {
        match query {
            Query::Term { field, value } => self.term(field, value),
            Query::BareTerm(value) => self.term(self.schema.default_field(), value),
            Query::Range { low, high, .. } => self
                .structures
                .range(low.map(ceil_micros), high.map(|ts| ts.timestamp_micros()))
                .into_iter()
                .collect(),
            Query::And(left, right) => {
                let left = self.eval(left);
                if left.is_empty() {
                    return left;
                }
                let right = self.eval(right);
                left.intersection(&right).copied().collect()
            }
            Query::Or(left, right) => {
                let mut left = self.eval(left);
                left.extend(self.eval(right));
                left
            }
            Query::Not(inner) => {
                let inner = self.eval(inner);
                self.structures
                    .all_positions()
                    .difference(&inner)
                    .copied()
                    .collect()
            }
        }
    }

    fn term(&self, field: &str, value: &str) -> BTreeSet<u64> {
        match self.schema.kind_of(field) {
            Some(FieldKind::Identifier) => self
                .structures
                .lookup_exact(field, value)
                .iter()
                .copied()
                .collect(),
            Some(FieldKind::Text) => self.text_term(field, value),
            Some(FieldKind::Timestamp) => match parse_time_literal(value) {
                Some(span) => self
                    .structures
                    .range(
                        Some(ceil_micros(span.start)),
                        Some(span.end.timestamp_micros()),
                    )
                    .into_iter()
                    .collect(),
                None => BTreeSet::new(),
            },
            None => BTreeSet::new(),
        }
    }

    /// Documents containing every token of `value`.
    fn text_term(&self, field: &str, value: &str) -> BTreeSet<u64> {
        let tokens = tokenize(value);
        let mut lists: Vec<_> = tokens
            .iter()
            .map(|token| self.structures.lookup_token(field, token))
            .collect();
        // Intersect starting from the shortest list
        lists.sort_by_key(|list| list.len());

        let Some((first, rest)) = lists.split_first() else {
            return BTreeSet::new();
        };
        first
            .iter()
            .map(|posting| posting.position)
            .filter(|position| {
                rest.iter()
                    .all(|list| list.binary_search_by_key(position, |p| p.position).is_ok())
            })
            .collect()
    }
}
