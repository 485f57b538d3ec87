//! Storage keys: (contract id, raw key) pairs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// A key in contract storage.
///
/// The on-disk form is `contract_id` as big-endian signed 32-bit, followed
/// by the raw key bytes; big-endian keeps per-contract keys contiguous under
/// ascending iteration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    /// Owning contract id; negative ids are native contracts.
    pub id: i32,
    /// Raw key bytes within the contract's namespace.
    pub key: Vec<u8>,
}

impl StorageKey {
    /// Creates a key.
    pub fn new(id: i32, key: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            key: key.into(),
        }
    }

    /// A key consisting of a single prefix byte.
    pub fn from_prefix(id: i32, prefix: u8) -> Self {
        Self::new(id, vec![prefix])
    }

    /// A prefix byte followed by a payload.
    pub fn with_suffix(id: i32, prefix: u8, suffix: &[u8]) -> Self {
        let mut key = Vec::with_capacity(1 + suffix.len());
        key.push(prefix);
        key.extend_from_slice(suffix);
        Self::new(id, key)
    }

    /// The canonical byte form: id (BE) ‖ key.
    pub fn to_array(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.key.len());
        bytes.extend_from_slice(&self.id.to_be_bytes());
        bytes.extend_from_slice(&self.key);
        bytes
    }

    /// Parses the canonical byte form.
    pub fn from_array(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(Error::MalformedKey(format!(
                "key of {} bytes lacks a contract id",
                bytes.len()
            )));
        }
        let id = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok(Self::new(id, bytes[4..].to_vec()))
    }
}

impl Ord for StorageKey {
    /// Orders by the canonical byte form, so cache layers and the backend
    /// agree on iteration order (negative native ids included).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_array().cmp(&other.to_array())
    }
}

impl PartialOrd for StorageKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, hex::encode(&self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = StorageKey::with_suffix(-4, 12, b"hash");
        let bytes = key.to_array();
        assert_eq!(StorageKey::from_array(&bytes).unwrap(), key);
    }

    #[test]
    fn test_big_endian_id_orders_contracts_contiguously() {
        let a = StorageKey::new(1, vec![0xFF]);
        let b = StorageKey::new(2, vec![0x00]);
        assert!(a.to_array() < b.to_array());
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(StorageKey::from_array(&[0, 0]).is_err());
    }

    #[test]
    fn test_ordering_matches_byte_ordering() {
        let mut keys = vec![
            StorageKey::new(5, vec![2]),
            StorageKey::new(5, vec![1, 9]),
            StorageKey::new(4, vec![0xFF]),
        ];
        keys.sort();
        let mut arrays: Vec<Vec<u8>> = keys.iter().map(StorageKey::to_array).collect();
        let sorted = {
            let mut c = arrays.clone();
            c.sort();
            c
        };
        arrays.sort_by(|a, b| a.cmp(b));
        assert_eq!(arrays, sorted);
    }
}
