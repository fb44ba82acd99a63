//! Column family definitions for RocksDB.
//!
//! - documents: append-only message documents keyed by position
//! - meta: schema descriptor and the next position counter

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for documents
pub const CF_DOCUMENTS: &str = "documents";

/// Column family name for store metadata
pub const CF_META: &str = "meta";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_DOCUMENTS, CF_META];

/// Create column family options for documents (append-only, compressed)
fn documents_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_DOCUMENTS, documents_options()),
        ColumnFamilyDescriptor::new(CF_META, Options::default()),
    ]
}
