//! # replikit-sync
//!
//! The replication engine of the replikit stack: the wire protocol, the
//! sync transports, the background replication loop, and the typed
//! collection facades that tie CRDT state to storage slots.
//!
//! The top-level entry point is [`Replica`]: one instance of the library,
//! with a stable replica id, its own vector clock, a storage backend, and
//! a sync engine (WebSocket or manual). Collections hand out typed views
//! over named slots; every local write is replicated as a
//! [`SyncOperation`], and remote operations pass through a causality
//! filter before touching storage.
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use replikit_sync::{Replica, ReplicaConfig};
//!
//! // Offline-first: manual sync, in-memory storage.
//! let replica = Replica::open(ReplicaConfig::new("device-1")).unwrap();
//!
//! let cart = replica.counter("cart-total");
//! cart.increment(2).await.unwrap();
//! cart.decrement(1).await.unwrap();
//! assert_eq!(cart.value().unwrap(), 1);
//! # });
//! ```
//!
//! Connected replicas configure a WebSocket transport and, usually, an
//! auto-sync interval:
//!
//! ```no_run
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! use std::time::Duration;
//! use replikit_sync::{Replica, ReplicaConfig};
//!
//! let replica = Replica::open(
//!     ReplicaConfig::new("device-1")
//!         .with_websocket("ws://localhost:4000/sync")
//!         .with_auto_sync(Duration::from_secs(5)),
//! )
//! .unwrap();
//! replica.connect().await.unwrap();
//! # });
//! ```

#![warn(missing_docs)]

mod collections;
mod config;
mod engine;
mod error;
mod replica;
mod replication;

pub mod hub;
pub mod protocol;

pub use collections::{
    ChangeEvent, CollectionWatch, CounterCollection, ListCollection, MapCollection,
    OrderedSetCollection, RegisterCollection, SetCollection, TombstoneSetCollection,
    TwoPhaseSetCollection,
};
pub use config::{
    AuthorizationConfig, BusinessHooks, ConflictMerger, OperationHook, ReplicaConfig, StorageKind,
    SyncKind,
};
pub use engine::{
    ConflictStream, ConnectionState, ManualSync, OperationStream, StatusStream, SyncEngine,
    SyncStatus, WebSocketConfig, WebSocketSync,
};
pub use error::{Result, SyncError};
pub use protocol::{
    ClientMessage, ConflictResolution, DataConflict, OperationKind, PartialSyncConfig,
    ReconciliationRequest, ReconciliationResponse, ReconciliationStatus, ReportedConflict,
    ServerMessage, SyncOperation,
};
pub use replica::Replica;
