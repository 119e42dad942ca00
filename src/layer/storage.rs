use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

/// Backend contract consumed by `Source` and `LayerCache`. Implementations are shared between the
/// foreground path and background flushing, so they do their own locking.
pub trait Storage: Send + Sync {
    fn get(&self, key: &Bytes) -> Result<Option<Bytes>, StorageError>;

    /// Must not fail under normal operation.
    fn add(&self, key: Bytes, value: Bytes) -> Result<(), StorageError>;

    fn remove(&self, key: &Bytes) -> Result<(), StorageError>;
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage lock was poisoned")]
    LockPoisoned,
    #[error("Storage backend failure: {0}")]
    Backend(String),
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<Bytes, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &Bytes) -> Result<Option<Bytes>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn add(&self, key: Bytes, value: Bytes) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &Bytes) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }
}
