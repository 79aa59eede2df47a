use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::traits::{RawStorage, Storage, Watch};
use crate::{StorageError, Value};

/// In-memory storage backend.
///
/// All data lives in a `BTreeMap`; nothing touches disk. The default
/// backend for tests and for replicas whose durability comes from the sync
/// server rather than local persistence.
///
/// Raw access serializes the stored JSON value, so `get`/`set` and
/// `get_raw`/`set_raw` always observe the same slot contents.
///
/// # Example
///
/// ```
/// use replikit_store::{MemoryStorage, Storage};
/// use serde_json::json;
///
/// let mut store = MemoryStorage::new();
/// store.set("k", json!(1)).unwrap();
/// assert_eq!(store.keys().unwrap(), ["k"]);
///
/// store.delete("k").unwrap();
/// assert!(store.get("k").is_err());
/// ```
#[derive(Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, Value>,
    watchers: BTreeMap<String, Vec<mpsc::UnboundedSender<Value>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slot is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify(&mut self, key: &str, value: &Value) {
        if let Some(senders) = self.watchers.get_mut(key) {
            senders.retain(|tx| tx.send(value.clone()).is_ok());
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Value, StorageError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::missing_key(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.clone());
        self.notify(key, &value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.contains_key(key))
    }

    fn watch(&mut self, key: &str) -> Watch {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.entry(key.to_string()).or_default().push(tx);
        Watch::new(rx)
    }
}

impl RawStorage for MemoryStorage {
    fn get_raw(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let value = self.get(key)?;
        serde_json::to_vec(&value).map_err(|e| StorageError::new(e.to_string()))
    }

    fn set_raw(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| StorageError::new(e.to_string()))?;
        self.set(key, value)
    }
}
