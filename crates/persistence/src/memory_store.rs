//! In-memory reference backend.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::store::{Store, StoreBatch};

/// A `BTreeMap`-backed store, used by tests and private networks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    fn seek(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn write_batch(&self, batch: StoreBatch) {
        let mut entries = self.entries.write();
        for (key, value) in batch.puts {
            entries.insert(key, value);
        }
        for key in batch.deletes {
            entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_is_prefix_bounded_and_sorted() {
        let store = MemoryStore::new();
        let mut batch = StoreBatch::new();
        batch.put(vec![1, 2], b"a".to_vec());
        batch.put(vec![1, 1], b"b".to_vec());
        batch.put(vec![2, 0], b"c".to_vec());
        store.write_batch(batch);

        let found = store.seek(&[1]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, vec![1, 1]);
        assert_eq!(found[1].0, vec![1, 2]);
    }

    #[test]
    fn test_batch_applies_puts_then_deletes() {
        let store = MemoryStore::new();
        let mut batch = StoreBatch::new();
        batch.put(vec![9], b"x".to_vec());
        batch.delete(vec![9]);
        store.write_batch(batch);
        assert!(!store.contains(&[9]));
    }
}
