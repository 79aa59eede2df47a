//! The top-level replica handle.

use std::sync::{Arc, Mutex};

use replikit::VectorClock;
use replikit_store::{MemoryStorage, Storage, Value};
use tokio::task::JoinHandle;

use crate::collections::{
    ChangeEvent, CounterCollection, ListCollection, MapCollection, OrderedSetCollection,
    RegisterCollection, SetCollection, SlotContext, TombstoneSetCollection, TwoPhaseSetCollection,
};
use crate::config::{ReplicaConfig, StorageKind, SyncKind};
use crate::engine::{ConflictStream, ConnectionState, ManualSync, StatusStream, SyncEngine,
    WebSocketConfig, WebSocketSync};
use crate::error::{Result, SyncError};
use crate::hub::{Hub, OverflowStrategy, Subscription};
use crate::protocol::{
    PartialSyncConfig, ReconciliationRequest, ReconciliationResponse, SyncOperation,
};
use crate::replication::{
    spawn_broadcast_consumer, spawn_loops, OperationApplier, OutboundQueue, ReplicationLoops,
    SharedClock, SharedStorage,
};

/// One instance of the library: storage, vector clock, sync engine, and
/// the background replication machinery, bound to a stable replica id.
///
/// A replica hands out typed collection facades over named storage slots;
/// every local mutation increments the replica's clock component and is
/// offered to the transport. With an `auto_sync_interval` configured (and
/// a non-manual transport), a pull loop and a reconcile loop run in the
/// background for the replica's lifetime.
///
/// # Example
///
/// ```
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// use replikit_sync::{Replica, ReplicaConfig};
///
/// let replica = Replica::open(ReplicaConfig::new("device-1")).unwrap();
/// let todos = replica.list::<String>("todos");
///
/// todos.append("write docs".into()).await.unwrap();
/// assert_eq!(todos.to_vec().unwrap(), ["write docs"]);
/// assert_eq!(replica.clock().get("device-1"), 1);
/// # });
/// ```
pub struct Replica {
    config: ReplicaConfig,
    storage: SharedStorage,
    clock: SharedClock,
    engine: Arc<SyncEngine>,
    queue: OutboundQueue,
    events: Hub<ChangeEvent>,
    applier: Arc<OperationApplier>,
    loops: Mutex<Option<ReplicationLoops>>,
    broadcast_consumer: Mutex<Option<JoinHandle<()>>>,
}

impl Replica {
    /// Build a replica from its configuration.
    ///
    /// Background loops (if configured) start immediately and idle until
    /// the transport comes online; the connection itself is opened by
    /// [`connect`](Self::connect).
    pub fn open(config: ReplicaConfig) -> Result<Self> {
        config.validate()?;

        let storage: SharedStorage = match config.storage {
            StorageKind::Memory => Arc::new(Mutex::new(
                Box::new(MemoryStorage::new()) as Box<dyn Storage>
            )),
        };

        let engine = Arc::new(match config.sync {
            SyncKind::Manual => SyncEngine::Manual(ManualSync::new()),
            SyncKind::WebSocket => {
                let url = config
                    .sync_url
                    .clone()
                    .ok_or_else(|| SyncError::Init("websocket sync without a url".into()))?;
                SyncEngine::WebSocket(WebSocketSync::new(WebSocketConfig::new(url)))
            }
        });

        let clock: SharedClock = Arc::new(Mutex::new(VectorClock::new()));
        let queue: OutboundQueue = Arc::new(Mutex::new(Vec::new()));

        let applier = Arc::new(OperationApplier::new(
            config.replica_id.clone(),
            Arc::clone(&storage),
            Arc::clone(&clock),
            config.business_logic.clone(),
            config.conflict_merger.clone(),
        ));

        let broadcast_consumer = if engine.is_manual() {
            None
        } else {
            Some(spawn_broadcast_consumer(
                Arc::clone(&engine),
                Arc::clone(&applier),
            ))
        };

        let loops = match (config.auto_sync_interval, engine.is_manual()) {
            (Some(interval), false) => Some(spawn_loops(
                Arc::clone(&engine),
                Arc::clone(&applier),
                Arc::clone(&queue),
                Arc::clone(&clock),
                config.replica_id.clone(),
                interval,
            )),
            _ => None,
        };

        Ok(Self {
            config,
            storage,
            clock,
            engine,
            queue,
            events: Hub::new(OverflowStrategy::Unbounded),
            applier,
            loops: Mutex::new(loops),
            broadcast_consumer: Mutex::new(broadcast_consumer),
        })
    }

    /// This replica's stable identifier.
    #[must_use]
    pub fn replica_id(&self) -> &str {
        &self.config.replica_id
    }

    /// The configured authorization extension point, if any.
    #[must_use]
    pub fn authorization(&self) -> Option<&crate::config::AuthorizationConfig> {
        self.config.authorization.as_ref()
    }

    /// A snapshot of the replica's vector clock.
    #[must_use]
    pub fn clock(&self) -> VectorClock {
        self.clock.lock().unwrap().clone()
    }

    /// Open the sync connection (no-op in manual mode).
    pub async fn connect(&self) -> Result<()> {
        self.engine.connect().await
    }

    /// Close the sync connection (no-op in manual mode).
    pub async fn disconnect(&self) {
        self.engine.disconnect().await;
    }

    /// The transport's lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.engine.connection_state()
    }

    /// Subscribe to sync status transitions.
    #[must_use]
    pub fn status(&self) -> StatusStream {
        self.engine.status()
    }

    /// Subscribe to server-reported conflicts.
    #[must_use]
    pub fn conflicts(&self) -> ConflictStream {
        self.engine.conflicts()
    }

    /// Subscribe to local change events (one per committed write).
    #[must_use]
    pub fn events(&self) -> Subscription<ChangeEvent> {
        self.events.subscribe()
    }

    /// Run one pull-and-apply plus one reconciliation round right now.
    ///
    /// On a manual transport this is the identity: the pull is empty and
    /// the reconciliation echoes the client's state.
    pub async fn sync_now(&self) -> Result<()> {
        let batch = self.engine.pull(None).await?;
        self.applier.apply_operations(batch);

        let operations: Vec<SyncOperation> = self.queue.lock().unwrap().drain(..).collect();
        let request = ReconciliationRequest::new(
            operations.clone(),
            self.clock(),
            &self.config.replica_id,
        );
        match self.engine.reconcile(request).await {
            Ok(response) => {
                self.applier.integrate(response);
                Ok(())
            }
            Err(e) => {
                self.queue.lock().unwrap().extend(operations);
                Err(e)
            }
        }
    }

    /// Install a partial-sync selection on the server.
    pub async fn partial_sync(&self, config: PartialSyncConfig) -> Result<()> {
        self.engine.partial_sync(config).await
    }

    /// Feed remote operations through the causality filter, as the pull
    /// loop would. The entry point for manual-mode replication.
    pub fn apply_remote_operations(&self, operations: Vec<SyncOperation>) {
        self.applier.apply_operations(operations);
    }

    /// Fold a reconciliation response into local state, as the reconcile
    /// loop would. The entry point for manual-mode reconciliation.
    pub fn integrate_reconciliation(&self, response: ReconciliationResponse) {
        self.applier.integrate(response);
    }

    /// Operations waiting to ride with the next reconciliation round.
    #[must_use]
    pub fn queued_operations(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Raw view of a storage slot, mainly for diagnostics and tests.
    pub fn slot_value(&self, key: &str) -> Option<Value> {
        self.storage.lock().unwrap().get(key).ok()
    }

    /// A last-writer-wins register over the slot `name`.
    #[must_use]
    pub fn register<T>(&self, name: &str) -> RegisterCollection<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone,
    {
        RegisterCollection::new(self.slot(name))
    }

    /// A grow-only set over the slot `name`.
    #[must_use]
    pub fn gset<T>(&self, name: &str) -> SetCollection<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Ord + Clone,
    {
        SetCollection::new(self.slot(name))
    }

    /// A two-phase set over the slot `name`.
    #[must_use]
    pub fn two_phase_set<T>(&self, name: &str) -> TwoPhaseSetCollection<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Ord + Clone,
    {
        TwoPhaseSetCollection::new(self.slot(name))
    }

    /// A keyed tombstone set over the slot `name`.
    #[must_use]
    pub fn tombstone_set<T>(&self, name: &str) -> TombstoneSetCollection<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone,
    {
        TombstoneSetCollection::new(self.slot(name))
    }

    /// A keyed ordered set over the slot `name`.
    #[must_use]
    pub fn ordered_set<T>(&self, name: &str) -> OrderedSetCollection<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone,
    {
        OrderedSetCollection::new(self.slot(name))
    }

    /// An observed-remove map over the slot `name`.
    #[must_use]
    pub fn map<T>(&self, name: &str) -> MapCollection<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone,
    {
        MapCollection::new(self.slot(name))
    }

    /// A positive-negative counter over the slot `name`.
    #[must_use]
    pub fn counter(&self, name: &str) -> CounterCollection {
        CounterCollection::new(self.slot(name))
    }

    /// A replicated sequence over the slot `name`.
    #[must_use]
    pub fn list<T>(&self, name: &str) -> ListCollection<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Clone,
    {
        ListCollection::new(self.slot(name))
    }

    /// Stop the background tasks. Called automatically on drop.
    pub fn shutdown(&self) {
        if let Some(loops) = self.loops.lock().unwrap().take() {
            loops.abort();
        }
        if let Some(consumer) = self.broadcast_consumer.lock().unwrap().take() {
            consumer.abort();
        }
        self.events.close();
    }

    fn slot(&self, name: &str) -> SlotContext {
        SlotContext {
            name: name.to_string(),
            replica_id: self.config.replica_id.clone(),
            storage: Arc::clone(&self.storage),
            clock: Arc::clone(&self.clock),
            engine: Arc::clone(&self.engine),
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
        }
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        self.shutdown();
    }
}
