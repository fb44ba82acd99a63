//! Key encoding and decoding for the storage layer.
//!
//! Document key format: `doc:{position:020}`
//! - position: store-assigned sequence number, zero-padded to 20 digits
//!
//! Zero padding makes lexicographic key order equal to append order, so a
//! forward iteration over the documents column family is a scan from
//! position 0 upwards.

use crate::error::StorageError;

/// Key for a stored document
/// Format: doc:{position:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocKey {
    pub position: u64,
}

impl DocKey {
    pub fn new(position: u64) -> Self {
        Self { position }
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("doc:{:020}", self.position).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let digits = s
            .strip_prefix("doc:")
            .ok_or_else(|| StorageError::Key(format!("Invalid document key format: {}", s)))?;
        if digits.len() != 20 {
            return Err(StorageError::Key(format!(
                "Invalid document key width: {}",
                s
            )));
        }

        let position: u64 = digits
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid position: {}", e)))?;

        Ok(Self { position })
    }
}

/// Keys in the meta column family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKey {
    /// Serialized schema descriptor
    Schema,
    /// Next position to assign (big-endian u64)
    NextPosition,
}

impl MetaKey {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            MetaKey::Schema => b"schema",
            MetaKey::NextPosition => b"next_position",
        }
    }
}

/// Encode a position counter value.
pub fn encode_position(position: u64) -> [u8; 8] {
    position.to_be_bytes()
}

/// Decode a position counter value.
pub fn decode_position(bytes: &[u8]) -> Result<u64, StorageError> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Key(format!("Invalid counter length: {}", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_key_roundtrip() {
        let key = DocKey::new(12345);
        let decoded = DocKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_doc_key_lexicographic_order() {
        let keys = [0u64, 9, 10, 99, 100, 1_000_000];
        for pair in keys.windows(2) {
            assert!(DocKey::new(pair[0]).to_bytes() < DocKey::new(pair[1]).to_bytes());
        }
    }

    #[test]
    fn test_doc_key_rejects_garbage() {
        assert!(DocKey::from_bytes(b"evt:00000000000000000001").is_err());
        assert!(DocKey::from_bytes(b"doc:12").is_err());
        assert!(DocKey::from_bytes(b"doc:0000000000000000000x").is_err());
    }

    #[test]
    fn test_position_counter_encoding() {
        assert_eq!(decode_position(&encode_position(42)).unwrap(), 42);
        assert!(decode_position(&[1, 2, 3]).is_err());
    }
}
