//! The stacked DAO: a cached write set over a store or another cache.

use std::collections::BTreeMap;

use helios_io::Serializable;

use crate::storage_item::StorageItem;
use crate::storage_key::StorageKey;
use crate::store::{Store, StoreBatch};
use crate::{Error, Result};

/// How a dirty entry relates to the backing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Not present in the backing layer.
    Added,
    /// Present in the backing layer with a different value.
    Changed,
    /// Present in the backing layer, removed here (tombstone).
    Deleted,
}

#[derive(Debug, Clone)]
struct Trackable {
    state: TrackState,
    item: Option<StorageItem>,
}

/// The detached dirty set of a cache, ready to be replayed onto its parent.
#[derive(Debug, Default)]
pub struct DirtySet {
    entries: BTreeMap<StorageKey, (TrackState, Option<StorageItem>)>,
}

impl DirtySet {
    /// Number of tracked mutations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates mutations in ascending key order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&StorageKey, &(TrackState, Option<StorageItem>))> {
        self.entries.iter()
    }

    /// A deterministic digest over the sorted mutation set, for
    /// block-state-root computation.
    pub fn digest(&self) -> [u8; 32] {
        let mut data = Vec::new();
        for (key, (state, item)) in &self.entries {
            data.extend_from_slice(&key.to_array());
            data.push(match state {
                TrackState::Added => 0,
                TrackState::Changed => 1,
                TrackState::Deleted => 2,
            });
            if let Some(item) = item {
                data.extend_from_slice(&item.value);
            }
        }
        helios_crypto::sha256(&data)
    }
}

enum Backing<'a> {
    Store(&'a dyn Store),
    Cache(&'a DataCache<'a>),
}

/// A snapshot view with a private write set.
///
/// Reads walk the layer stack innermost-first; a tombstone shadows deeper
/// values. Writes stay invisible to the parent until [`DataCache::into_dirty`]
/// hands them over and the parent applies them in one step. Dropping the
/// cache discards everything, leaving the parent bit-identical.
pub struct DataCache<'a> {
    backing: Backing<'a>,
    dirty: BTreeMap<StorageKey, Trackable>,
}

impl<'a> DataCache<'a> {
    /// A cache over the raw backend.
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            backing: Backing::Store(store),
            dirty: BTreeMap::new(),
        }
    }

    /// A child cache over another cache.
    pub fn wrap(parent: &'a DataCache<'a>) -> Self {
        Self {
            backing: Backing::Cache(parent),
            dirty: BTreeMap::new(),
        }
    }

    fn backing_get(&self, key: &StorageKey) -> Option<StorageItem> {
        match &self.backing {
            Backing::Store(store) => store
                .try_get(&key.to_array())
                .and_then(|bytes| helios_io::from_bytes(&bytes).ok()),
            Backing::Cache(cache) => cache.try_get(key),
        }
    }

    /// Reads through the layer stack.
    pub fn try_get(&self, key: &StorageKey) -> Option<StorageItem> {
        match self.dirty.get(key) {
            Some(entry) => entry.item.clone(),
            None => self.backing_get(key),
        }
    }

    /// True when the key resolves to a value.
    pub fn contains(&self, key: &StorageKey) -> bool {
        self.try_get(key).is_some()
    }

    /// Writes a value into this layer.
    pub fn put(&mut self, key: StorageKey, item: StorageItem) -> Result<()> {
        if let Some(existing) = self.try_get(&key) {
            if existing.is_constant {
                return Err(Error::ItemIsConstant);
            }
        }
        let state = if self.backing_get(&key).is_some() {
            TrackState::Changed
        } else {
            TrackState::Added
        };
        self.dirty.insert(
            key,
            Trackable {
                state,
                item: Some(item),
            },
        );
        Ok(())
    }

    /// Deletes a key in this layer (a tombstone if the backing has it).
    pub fn delete(&mut self, key: StorageKey) -> Result<()> {
        if let Some(existing) = self.try_get(&key) {
            if existing.is_constant {
                return Err(Error::ItemIsConstant);
            }
        }
        if self.backing_get(&key).is_some() {
            self.dirty.insert(
                key,
                Trackable {
                    state: TrackState::Deleted,
                    item: None,
                },
            );
        } else {
            // Nothing below: forget any local addition entirely.
            self.dirty.remove(&key);
        }
        Ok(())
    }

    /// Deterministic ascending iteration over `id`'s keys with `key_prefix`,
    /// merged across layers and honoring tombstones.
    pub fn find(&self, id: i32, key_prefix: &[u8]) -> Vec<(StorageKey, StorageItem)> {
        let mut merged: BTreeMap<StorageKey, Option<StorageItem>> = BTreeMap::new();

        let deeper: Vec<(StorageKey, StorageItem)> = match &self.backing {
            Backing::Store(store) => {
                let prefix = StorageKey::new(id, key_prefix.to_vec()).to_array();
                store
                    .seek(&prefix)
                    .into_iter()
                    .filter_map(|(key, value)| {
                        let key = StorageKey::from_array(&key).ok()?;
                        let item = helios_io::from_bytes(&value).ok()?;
                        Some((key, item))
                    })
                    .collect()
            }
            Backing::Cache(cache) => cache.find(id, key_prefix),
        };
        for (key, item) in deeper {
            merged.insert(key, Some(item));
        }

        for (key, entry) in &self.dirty {
            if key.id == id && key.key.starts_with(key_prefix) {
                merged.insert(key.clone(), entry.item.clone());
            }
        }

        merged
            .into_iter()
            .filter_map(|(key, item)| item.map(|item| (key, item)))
            .collect()
    }

    /// Detaches the write set; the cache is consumed.
    pub fn into_dirty(self) -> DirtySet {
        DirtySet {
            entries: self
                .dirty
                .into_iter()
                .map(|(key, entry)| (key, (entry.state, entry.item)))
                .collect(),
        }
    }

    /// Replays a child's write set onto this layer in one step.
    pub fn apply(&mut self, dirty: DirtySet) {
        for (key, (state, item)) in dirty.entries {
            match (state, item) {
                (TrackState::Deleted, _) | (_, None) => {
                    // Recompute the tombstone against *this* layer's backing.
                    if self.backing_get(&key).is_some() {
                        self.dirty.insert(
                            key,
                            Trackable {
                                state: TrackState::Deleted,
                                item: None,
                            },
                        );
                    } else {
                        self.dirty.remove(&key);
                    }
                }
                (_, Some(item)) => {
                    let state = if self.backing_get(&key).is_some() {
                        TrackState::Changed
                    } else {
                        TrackState::Added
                    };
                    self.dirty.insert(
                        key,
                        Trackable {
                            state,
                            item: Some(item),
                        },
                    );
                }
            }
        }
    }

    /// Converts the write set into a raw batch for the backend.
    pub fn into_batch(self) -> Result<StoreBatch> {
        let mut batch = StoreBatch::new();
        for (key, entry) in self.dirty {
            match entry.item {
                Some(item) => {
                    let mut writer = helios_io::BinaryWriter::with_capacity(item.size());
                    item.serialize(&mut writer)?;
                    batch.put(key.to_array(), writer.into_bytes());
                }
                None => batch.delete(key.to_array()),
            }
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        let mut cache = DataCache::new(&store);
        cache
            .put(StorageKey::new(1, b"a".to_vec()), StorageItem::new(b"1"))
            .unwrap();
        cache
            .put(StorageKey::new(1, b"b".to_vec()), StorageItem::new(b"2"))
            .unwrap();
        let batch = cache.into_batch().unwrap();
        store.write_batch(batch);
        store
    }

    #[test]
    fn test_read_through_layers() {
        let store = seeded_store();
        let block = DataCache::new(&store);
        let mut tx = DataCache::wrap(&block);
        assert_eq!(
            tx.try_get(&StorageKey::new(1, b"a".to_vec())).unwrap().value,
            b"1"
        );
        tx.put(StorageKey::new(1, b"a".to_vec()), StorageItem::new(b"9"))
            .unwrap();
        assert_eq!(
            tx.try_get(&StorageKey::new(1, b"a".to_vec())).unwrap().value,
            b"9"
        );
        // Parent unchanged.
        assert_eq!(
            block.try_get(&StorageKey::new(1, b"a".to_vec())).unwrap().value,
            b"1"
        );
    }

    #[test]
    fn test_tombstone_shadows_deeper_value() {
        let store = seeded_store();
        let block = DataCache::new(&store);
        let mut tx = DataCache::wrap(&block);
        tx.delete(StorageKey::new(1, b"a".to_vec())).unwrap();
        assert!(tx.try_get(&StorageKey::new(1, b"a".to_vec())).is_none());
        let found = tx.find(1, b"");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.key, b"b");
    }

    #[test]
    fn test_discard_leaves_parent_untouched() {
        let store = seeded_store();
        let mut block = DataCache::new(&store);
        let before: Vec<_> = block.find(1, b"");
        {
            let mut tx = DataCache::wrap(&block);
            tx.put(StorageKey::new(1, b"c".to_vec()), StorageItem::new(b"3"))
                .unwrap();
            tx.delete(StorageKey::new(1, b"a".to_vec())).unwrap();
            // Dropped without commit.
        }
        assert_eq!(block.find(1, b""), before);
        // Mutating afterwards still works.
        block
            .put(StorageKey::new(1, b"d".to_vec()), StorageItem::new(b"4"))
            .unwrap();
    }

    #[test]
    fn test_commit_propagates_atomically() {
        let store = seeded_store();
        let mut block = DataCache::new(&store);
        let dirty = {
            let mut tx = DataCache::wrap(&block);
            tx.put(StorageKey::new(1, b"c".to_vec()), StorageItem::new(b"3"))
                .unwrap();
            tx.delete(StorageKey::new(1, b"b".to_vec())).unwrap();
            tx.into_dirty()
        };
        block.apply(dirty);
        let keys: Vec<Vec<u8>> = block.find(1, b"").into_iter().map(|(k, _)| k.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);

        // And down to the store.
        store.write_batch(block.into_batch().unwrap());
        let fresh = DataCache::new(&store);
        let keys: Vec<Vec<u8>> = fresh.find(1, b"").into_iter().map(|(k, _)| k.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_constant_item_is_immutable() {
        let store = MemoryStore::new();
        let mut cache = DataCache::new(&store);
        cache
            .put(StorageKey::new(2, b"k".to_vec()), StorageItem::constant(b"v"))
            .unwrap();
        assert_eq!(
            cache.put(StorageKey::new(2, b"k".to_vec()), StorageItem::new(b"w")),
            Err(Error::ItemIsConstant)
        );
        assert_eq!(
            cache.delete(StorageKey::new(2, b"k".to_vec())),
            Err(Error::ItemIsConstant)
        );
    }

    #[test]
    fn test_find_merges_layers_in_order() {
        let store = seeded_store();
        let block = DataCache::new(&store);
        let mut tx = DataCache::wrap(&block);
        tx.put(StorageKey::new(1, b"ab".to_vec()), StorageItem::new(b"x"))
            .unwrap();
        let keys: Vec<Vec<u8>> = tx.find(1, b"").into_iter().map(|(k, _)| k.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"ab".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_dirty_digest_is_deterministic() {
        let store = seeded_store();
        let make = || {
            let block = DataCache::new(&store);
            let mut tx = DataCache::wrap(&block);
            tx.put(StorageKey::new(1, b"z".to_vec()), StorageItem::new(b"9"))
                .unwrap();
            tx.delete(StorageKey::new(1, b"a".to_vec())).unwrap();
            tx.into_dirty().digest()
        };
        assert_eq!(make(), make());
    }
}
