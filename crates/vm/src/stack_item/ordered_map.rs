//! Insertion-ordered map used by the Map stack item.

use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// A map from primitive stack items to arbitrary stack items.
///
/// Iteration order is insertion order; replacing an existing key keeps its
/// original position. Keys are compared by primitive value equality.
#[derive(Debug, Clone, Default)]
pub struct OrderedMap {
    entries: Vec<(StackItem, StackItem)>,
}

impl OrderedMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_valid_key(key: &StackItem) -> VmResult<()> {
        match key {
            StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::ByteString(_) => Ok(()),
            other => Err(VmError::invalid_type(
                "primitive map key",
                other.type_name(),
            )),
        }
    }

    fn position(&self, key: &StackItem) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.primitive_equals(key))
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &StackItem) -> VmResult<Option<&StackItem>> {
        Self::ensure_valid_key(key)?;
        Ok(self.position(key).map(|i| &self.entries[i].1))
    }

    /// True when the key is present.
    pub fn contains_key(&self, key: &StackItem) -> VmResult<bool> {
        Self::ensure_valid_key(key)?;
        Ok(self.position(key).is_some())
    }

    /// Inserts or replaces; replacement preserves insertion position.
    pub fn insert(&mut self, key: StackItem, value: StackItem) -> VmResult<()> {
        Self::ensure_valid_key(&key)?;
        match self.position(&key) {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Removes a key, returning whether it was present.
    pub fn remove(&mut self, key: &StackItem) -> VmResult<bool> {
        Self::ensure_valid_key(key)?;
        match self.position(key) {
            Some(index) => {
                self.entries.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &StackItem> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &StackItem> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(StackItem, StackItem)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    #[test]
    fn test_insertion_order_preserved() {
        let mut map = OrderedMap::new();
        for i in [3, 1, 2] {
            map.insert(
                StackItem::Integer(BigInt::from(i)),
                StackItem::Integer(BigInt::from(i * 10)),
            )
            .unwrap();
        }
        let keys: Vec<BigInt> = map
            .keys()
            .map(|k| match k {
                StackItem::Integer(v) => v.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, vec![3.into(), 1.into(), 2.into()]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut map = OrderedMap::new();
        map.insert(StackItem::from_bytes(b"a"), StackItem::Boolean(false))
            .unwrap();
        map.insert(StackItem::from_bytes(b"b"), StackItem::Boolean(false))
            .unwrap();
        map.insert(StackItem::from_bytes(b"a"), StackItem::Boolean(true))
            .unwrap();
        assert_eq!(map.len(), 2);
        let first = map.iter().next().unwrap();
        assert!(first.0.primitive_equals(&StackItem::from_bytes(b"a")));
        assert_eq!(first.1, StackItem::Boolean(true));
    }

    #[test]
    fn test_compound_key_rejected() {
        let mut map = OrderedMap::new();
        let key = StackItem::new_array(Vec::new());
        assert!(map.insert(key, StackItem::Null).is_err());
    }
}
