//! Key-prefixed persistent storage and the stacked DAO layer.
//!
//! A [`Store`] is the raw backend. A [`DataCache`] wraps a store (or another
//! cache) with a dirty set that commits atomically or is discarded whole;
//! every state mutation in the node flows through one.

pub mod data_cache;
pub mod memory_store;
pub mod storage_item;
pub mod storage_key;
pub mod store;

pub use data_cache::{DataCache, DirtySet, TrackState};
pub use memory_store::MemoryStore;
pub use storage_item::StorageItem;
pub use storage_key::StorageKey;
pub use store::{Store, StoreBatch};

/// Errors raised by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("storage key malformed: {0}")]
    MalformedKey(String),

    #[error("storage item malformed: {0}")]
    MalformedItem(String),

    #[error("constant storage item cannot be modified")]
    ItemIsConstant,

    #[error("io: {0}")]
    Io(#[from] helios_io::Error),
}

/// The result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;
