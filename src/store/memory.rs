//! In-memory store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{KeyValueStore, StoreError, StoreKey};

/// Process-local [`KeyValueStore`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Raw write that bypasses any cache bookkeeping. Used to simulate
    /// corruption and crashes between related writes.
    pub fn insert_raw(&self, key: &StoreKey, value: Vec<u8>) {
        self.entries.write().insert(key.as_str().to_string(), value);
    }

    /// Raw presence check.
    pub fn contains(&self, key: &StoreKey) -> bool {
        self.entries.read().contains_key(key.as_str())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key.as_str()).cloned())
    }

    async fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(key.as_str().to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> Result<(), StoreError> {
        self.entries.write().remove(key.as_str());
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<StoreKey>, StoreError> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| StoreKey::from_stored(key.clone()))
            .collect())
    }

    async fn value_size(&self, key: &StoreKey) -> Result<Option<u64>, StoreError> {
        Ok(self
            .entries
            .read()
            .get(key.as_str())
            .map(|value| value.len() as u64))
    }

    async fn key_count(&self) -> Result<usize, StoreError> {
        Ok(self.len())
    }
}
