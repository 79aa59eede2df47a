//! # replikit-store
//!
//! The key/value storage surface a replikit replica runs against.
//!
//! Storage is a mapping from string keys to opaque JSON values
//! ([`Value`]); the replication engine never interprets slot contents
//! beyond serializing CRDT state in and out. Backends implement
//! [`Storage`] (and optionally [`RawStorage`] for byte-level access);
//! anything durable — sqlite, browser storage, a remote KV — lives behind
//! the same trait outside this crate.
//!
//! One backend ships in-tree: [`MemoryStorage`], backed by `BTreeMap`s.
//! It is the default for tests and for replicas that treat the sync server
//! as the source of durability.
//!
//! # Example
//!
//! ```
//! use replikit_store::{MemoryStorage, Storage};
//! use serde_json::json;
//!
//! let mut store = MemoryStorage::new();
//! store.set("profile", json!({"name": "ada"})).unwrap();
//!
//! assert_eq!(store.get("profile").unwrap()["name"], "ada");
//! assert!(store.get("missing").is_err());
//! ```

#![warn(missing_docs)]

mod error;
mod memory;
mod model;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStorage;
pub use model::{DataModel, JsonModel, ModelStorage};
pub use traits::{RawStorage, Storage, Watch};

/// The opaque value type stored in a slot.
pub type Value = serde_json::Value;
