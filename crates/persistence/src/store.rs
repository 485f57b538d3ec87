//! The raw backend interface.

/// A batch of writes applied atomically.
#[derive(Debug, Default)]
pub struct StoreBatch {
    /// Keys to write with their new values.
    pub puts: Vec<(Vec<u8>, Vec<u8>)>,
    /// Keys to delete.
    pub deletes: Vec<Vec<u8>>,
}

impl StoreBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a write.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.puts.push((key, value));
    }

    /// Queues a deletion.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.deletes.push(key);
    }

    /// True when the batch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

/// A persistent byte-keyed store.
///
/// Implementations must apply `write_batch` atomically: on return either
/// every entry is visible or none is.
pub trait Store: Send + Sync {
    /// Reads the value at `key`.
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// True when `key` is present.
    fn contains(&self, key: &[u8]) -> bool {
        self.try_get(key).is_some()
    }

    /// All entries whose key starts with `prefix`, ascending by key.
    fn seek(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;

    /// Applies a batch atomically.
    fn write_batch(&self, batch: StoreBatch);
}
