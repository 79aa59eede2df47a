use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{RawStorage, StorageError};

/// A pluggable serialization pair for typed reads and writes.
///
/// The engine stores opaque values; applications that want typed access
/// pick a model and pipe their types through it. [`JsonModel`] is the
/// default and matches what the wire protocol carries.
pub trait DataModel {
    /// Serialize `value` to bytes.
    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StorageError>;

    /// Deserialize a `T` from bytes.
    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StorageError>;
}

/// The default data model: JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonModel;

impl DataModel for JsonModel {
    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|e| StorageError::new(e.to_string()))
    }

    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::new(e.to_string()))
    }
}

/// Typed access over any byte-capable backend, through a [`DataModel`].
///
/// Blanket-implemented for every [`RawStorage`], so backends get the typed
/// surface for free.
pub trait ModelStorage: RawStorage {
    /// Read and deserialize the value under `key`.
    fn get_with_model<T: DeserializeOwned, M: DataModel>(
        &self,
        key: &str,
        model: &M,
    ) -> Result<T, StorageError> {
        let bytes = self.get_raw(key)?;
        model.from_bytes(&bytes)
    }

    /// Serialize and write `value` under `key`.
    fn set_with_model<T: Serialize, M: DataModel>(
        &mut self,
        key: &str,
        value: &T,
        model: &M,
    ) -> Result<(), StorageError> {
        let bytes = model.to_bytes(value)?;
        self.set_raw(key, &bytes)
    }
}

impl<S: RawStorage + ?Sized> ModelStorage for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, Storage};
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sensor {
        temperature: f32,
    }

    #[test]
    fn typed_roundtrip_through_json_model() {
        let mut store = MemoryStorage::new();
        store
            .set_with_model("s1", &Sensor { temperature: 22.5 }, &JsonModel)
            .unwrap();

        let loaded: Sensor = store.get_with_model("s1", &JsonModel).unwrap();
        assert_eq!(loaded, Sensor { temperature: 22.5 });
    }

    #[test]
    fn typed_write_is_visible_as_value() {
        let mut store = MemoryStorage::new();
        store
            .set_with_model("s1", &Sensor { temperature: 10.0 }, &JsonModel)
            .unwrap();

        let value = store.get("s1").unwrap();
        assert_eq!(value["temperature"], 10.0);
    }

    #[test]
    fn deserialize_mismatch_is_an_error() {
        let mut store = MemoryStorage::new();
        store.set("s1", serde_json::json!("not a sensor")).unwrap();

        let loaded: Result<Sensor, _> = store.get_with_model("s1", &JsonModel);
        assert!(loaded.is_err());
    }
}
