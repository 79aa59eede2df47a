use tokio::sync::mpsc;

use crate::{StorageError, Value};

/// A live subscription to one storage slot.
///
/// Yields the new value each time the slot is written. Notification is
/// at-least-once per change; a subscriber that lags simply sees the writes
/// queued in order. The stream ends (`None`) when the backend is dropped.
pub struct Watch {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Watch {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { rx }
    }

    /// Wait for the next write to the watched slot.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Non-blocking variant: the next queued write, if one is pending.
    pub fn try_next(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

/// A key/value backend: string keys, opaque JSON values.
///
/// The replication engine treats the backend as a black box. The only
/// semantic requirements are the ones spelled out per method; in
/// particular `get` on an absent key is an error (callers that want a
/// default read pattern use `contains` or match on the error), `delete` is
/// idempotent, and `set` must notify watchers.
pub trait Storage: Send {
    /// The value under `key`, or an error if the key is absent.
    fn get(&self, key: &str) -> Result<Value, StorageError>;

    /// Unconditionally write `value` under `key`.
    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&mut self, key: &str) -> Result<(), StorageError>;

    /// Remove every key.
    fn clear(&mut self) -> Result<(), StorageError>;

    /// The current set of keys.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Whether `key` currently holds a value.
    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.keys()?.iter().any(|k| k == key))
    }

    /// Every `(key, value)` pair whose key starts with `prefix`.
    ///
    /// The default scans `keys()`; backends with native range queries
    /// should override it.
    fn query(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError> {
        let mut out = Vec::new();
        for key in self.keys()? {
            if key.starts_with(prefix) {
                let value = self.get(&key)?;
                out.push((key, value));
            }
        }
        Ok(out)
    }

    /// Subscribe to writes on `key`.
    fn watch(&mut self, key: &str) -> Watch;
}

/// Extension for backends that expose slot contents as raw bytes.
pub trait RawStorage: Storage {
    /// The bytes under `key`, or an error if the key is absent.
    fn get_raw(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write `bytes` under `key`.
    fn set_raw(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
}
