//! Opening and shutting down an index by location.

use std::path::Path;

use timemachine_storage::DocumentStore;
use timemachine_types::Schema;

use crate::error::SearchError;
use crate::index::{IndexConfig, TimeMachineIndex};

/// Whether an index already exists at `location`.
pub fn index_exists(location: impl AsRef<Path>) -> bool {
    DocumentStore::exists(location.as_ref())
}

/// Create the index at `location` if absent, otherwise open it.
///
/// Opening an existing index checks its stored schema against `schema` and
/// fails with `SchemaMismatch` if they differ. Calling this repeatedly on the
/// same location is safe and never loses documents.
pub fn init_or_open(
    location: impl AsRef<Path>,
    schema: Schema,
) -> Result<TimeMachineIndex, SearchError> {
    TimeMachineIndex::open_with_schema(IndexConfig::new(location.as_ref()), schema)
}

/// Flush and release `handle`.
pub fn shutdown(handle: &TimeMachineIndex) -> Result<(), SearchError> {
    handle.close()
}
