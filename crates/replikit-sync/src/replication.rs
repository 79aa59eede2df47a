//! The replication loop: remote application and background sync.
//!
//! [`OperationApplier`] is the causality filter between the transport and
//! storage: it skips loopback and dominated operations, applies the rest,
//! and advances the local clock. The background tasks ([`spawn_loops`])
//! pull on every tick and reconcile every fifth tick, pausing while the
//! transport is offline.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use replikit::clock::{ClockOrdering, VectorClock};
use replikit_store::Storage;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::{BusinessHooks, ConflictMerger};
use crate::engine::SyncEngine;
use crate::protocol::{
    ConflictResolution, OperationKind, ReconciliationRequest, ReconciliationResponse,
    SyncOperation,
};

pub(crate) type SharedStorage = Arc<Mutex<Box<dyn Storage>>>;
pub(crate) type SharedClock = Arc<Mutex<VectorClock>>;

/// Operations whose push failed on the offline write path, waiting to ride
/// along with the next reconciliation round.
pub(crate) type OutboundQueue = Arc<Mutex<Vec<SyncOperation>>>;

/// Applies remote operations to local state under the causality filter.
///
/// Application never fails local state: a bad operation is logged and
/// skipped. Applying the same batch twice is a no-op at the storage level
/// (`Set` rewrites the same value, `Delete` is idempotent, and the clock
/// join is idempotent).
pub(crate) struct OperationApplier {
    replica_id: String,
    storage: SharedStorage,
    clock: SharedClock,
    hooks: BusinessHooks,
    conflict_merger: Option<ConflictMerger>,
}

impl OperationApplier {
    pub(crate) fn new(
        replica_id: String,
        storage: SharedStorage,
        clock: SharedClock,
        hooks: BusinessHooks,
        conflict_merger: Option<ConflictMerger>,
    ) -> Self {
        Self {
            replica_id,
            storage,
            clock,
            hooks,
            conflict_merger,
        }
    }

    /// Apply a batch in order.
    pub(crate) fn apply_operations(&self, batch: Vec<SyncOperation>) {
        for operation in batch {
            self.apply(operation);
        }
    }

    /// Apply one remote operation.
    pub(crate) fn apply(&self, operation: SyncOperation) {
        if operation.replica == self.replica_id {
            trace!(id = %operation.id, "skipping loopback operation");
            return;
        }

        let dominated = {
            let local = self.clock.lock().unwrap();
            operation.clock.compare(&local) == ClockOrdering::Less
        };
        if dominated {
            debug!(
                id = %operation.id,
                key = %operation.key,
                "skipping operation dominated by local state"
            );
            return;
        }

        if !self.hooks.allows(&operation) {
            debug!(id = %operation.id, key = %operation.key, "operation vetoed by hook");
            return;
        }

        match operation.kind {
            OperationKind::Set => match &operation.value {
                Some(value) => {
                    let result = self
                        .storage
                        .lock()
                        .unwrap()
                        .set(&operation.key, value.clone());
                    if let Err(e) = result {
                        warn!(key = %operation.key, error = %e, "storage refused remote set");
                        return;
                    }
                }
                None => {
                    warn!(id = %operation.id, key = %operation.key, "set without a value");
                    return;
                }
            },
            OperationKind::Delete => {
                let result = self.storage.lock().unwrap().delete(&operation.key);
                if let Err(e) = result {
                    warn!(key = %operation.key, error = %e, "storage refused remote delete");
                    return;
                }
            }
            OperationKind::Reconcile => {
                if let Some(server_clock) = &operation.server_clock {
                    self.clock.lock().unwrap().merge(server_clock);
                }
            }
        }

        // Advance past the applied operation. Componentwise max, so
        // out-of-order delivery can never regress a component.
        self.clock.lock().unwrap().merge(&operation.clock);
    }

    /// Fold a reconciliation response into local state.
    pub(crate) fn integrate(&self, response: ReconciliationResponse) {
        if let Some(operations) = response.server_operations {
            self.apply_operations(operations);
        }

        if let Some(resolved) = &response.resolved_state {
            self.clock.lock().unwrap().merge(resolved);
        }

        for conflict in response.conflicts.unwrap_or_default() {
            let chosen = match conflict.resolution {
                ConflictResolution::Client => {
                    trace!(key = %conflict.key, "conflict resolved in the client's favor");
                    continue;
                }
                ConflictResolution::Server => conflict.server_value.clone(),
                ConflictResolution::Merge => {
                    let merged = self
                        .conflict_merger
                        .as_ref()
                        .and_then(|merger| merger(&conflict));
                    // Without a merger, merge degrades to the server value.
                    merged.or_else(|| conflict.server_value.clone())
                }
            };

            let result = {
                let mut storage = self.storage.lock().unwrap();
                match chosen {
                    Some(value) => storage.set(&conflict.key, value),
                    None => storage.delete(&conflict.key),
                }
            };
            match result {
                Ok(()) => debug!(key = %conflict.key, "applied conflict resolution"),
                Err(e) => warn!(key = %conflict.key, error = %e, "conflict resolution failed"),
            }
        }
    }
}

/// Handles for the background tasks; aborted on shutdown.
pub(crate) struct ReplicationLoops {
    handles: Vec<JoinHandle<()>>,
}

impl ReplicationLoops {
    pub(crate) fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for ReplicationLoops {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Spawn the consumer of server broadcasts. Runs for every non-manual
/// transport, with or without auto-sync.
pub(crate) fn spawn_broadcast_consumer(
    engine: Arc<SyncEngine>,
    applier: Arc<OperationApplier>,
) -> JoinHandle<()> {
    let mut incoming = engine.incoming();
    tokio::spawn(async move {
        while let Some(operation) = incoming.next().await {
            applier.apply(operation);
        }
    })
}

/// Spawn the pull and reconcile loops.
///
/// Pull runs every `interval` and feeds batches through the applier.
/// Reconcile runs every `5 × interval`, carrying the outbound queue and
/// the current clock; a failed round re-queues its operations and degrades
/// to keeping client state.
pub(crate) fn spawn_loops(
    engine: Arc<SyncEngine>,
    applier: Arc<OperationApplier>,
    queue: OutboundQueue,
    clock: SharedClock,
    replica_id: String,
    interval: Duration,
) -> ReplicationLoops {
    let pull_handle = {
        let engine = Arc::clone(&engine);
        let applier = Arc::clone(&applier);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !engine.connection_state().is_connected() {
                    continue;
                }
                match engine.pull(None).await {
                    Ok(batch) => {
                        if !batch.is_empty() {
                            debug!(count = batch.len(), "pulled operations");
                        }
                        applier.apply_operations(batch);
                    }
                    Err(e) => debug!(error = %e, "pull failed, will retry next tick"),
                }
            }
        })
    };

    let reconcile_handle = {
        let engine = Arc::clone(&engine);
        let applier = Arc::clone(&applier);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval * 5);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately; skip
            // it so the first round happens one period in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !engine.connection_state().is_connected() {
                    continue;
                }

                let operations: Vec<SyncOperation> =
                    { queue.lock().unwrap().drain(..).collect() };
                let client_state = clock.lock().unwrap().clone();
                let request =
                    ReconciliationRequest::new(operations.clone(), client_state, &replica_id);

                match engine.reconcile(request).await {
                    Ok(response) => applier.integrate(response),
                    Err(e) => {
                        debug!(error = %e, "reconcile failed, keeping client state");
                        if !operations.is_empty() {
                            queue.lock().unwrap().extend(operations);
                        }
                    }
                }
            }
        })
    };

    ReplicationLoops {
        handles: vec![pull_handle, reconcile_handle],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replikit_store::{MemoryStorage, Storage};
    use serde_json::json;

    fn shared_storage() -> SharedStorage {
        Arc::new(Mutex::new(Box::new(MemoryStorage::new()) as Box<dyn Storage>))
    }

    fn clock_of(components: &[(&str, u64)]) -> VectorClock {
        components
            .iter()
            .map(|&(r, c)| (r.to_string(), c))
            .collect()
    }

    fn applier(storage: &SharedStorage, clock: &SharedClock) -> OperationApplier {
        OperationApplier::new(
            "local".into(),
            Arc::clone(storage),
            Arc::clone(clock),
            BusinessHooks::default(),
            None,
        )
    }

    #[test]
    fn applies_remote_set_and_advances_clock() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let applier = applier(&storage, &clock);

        let op = SyncOperation::set("k", json!("v"), 1, "remote", clock_of(&[("remote", 1)]));
        applier.apply(op);

        assert_eq!(storage.lock().unwrap().get("k").unwrap(), json!("v"));
        assert_eq!(clock.lock().unwrap().get("remote"), 1);
    }

    #[test]
    fn skips_own_operations() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let applier = applier(&storage, &clock);

        let op = SyncOperation::set("k", json!("v"), 1, "local", clock_of(&[("local", 1)]));
        applier.apply(op);

        assert!(storage.lock().unwrap().get("k").is_err());
        assert!(clock.lock().unwrap().is_empty());
    }

    #[test]
    fn skips_operations_dominated_by_local_state() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(clock_of(&[("remote", 5), ("local", 2)])));
        let applier = applier(&storage, &clock);

        let stale = SyncOperation::set("k", json!("old"), 1, "remote", clock_of(&[("remote", 3)]));
        applier.apply(stale);

        assert!(storage.lock().unwrap().get("k").is_err());
        // Clock untouched.
        assert_eq!(clock.lock().unwrap().get("remote"), 5);
    }

    #[test]
    fn concurrent_operations_are_applied() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(clock_of(&[("local", 2)])));
        let applier = applier(&storage, &clock);

        let concurrent =
            SyncOperation::set("k", json!("v"), 1, "remote", clock_of(&[("remote", 1)]));
        applier.apply(concurrent);

        assert_eq!(storage.lock().unwrap().get("k").unwrap(), json!("v"));
        let after = clock.lock().unwrap().clone();
        assert_eq!(after.get("remote"), 1);
        assert_eq!(after.get("local"), 2);
    }

    #[test]
    fn delete_operations_remove_the_slot() {
        let storage = shared_storage();
        storage.lock().unwrap().set("k", json!("v")).unwrap();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let applier = applier(&storage, &clock);

        let op = SyncOperation::delete("k", 1, "remote", clock_of(&[("remote", 1)]));
        applier.apply(op);

        assert!(storage.lock().unwrap().get("k").is_err());
    }

    #[test]
    fn applying_twice_is_a_storage_noop() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let applier = applier(&storage, &clock);

        let op = SyncOperation::set("k", json!(7), 1, "remote", clock_of(&[("remote", 1)]));
        applier.apply(op.clone());
        let clock_after_first = clock.lock().unwrap().clone();

        applier.apply(op);
        assert_eq!(storage.lock().unwrap().get("k").unwrap(), json!(7));
        assert_eq!(*clock.lock().unwrap(), clock_after_first);
    }

    #[test]
    fn out_of_order_delivery_never_regresses_the_clock() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let applier = applier(&storage, &clock);

        let newer = SyncOperation::set("k", json!(2), 2, "remote", clock_of(&[("remote", 2)]));
        let older = SyncOperation::set("k", json!(1), 1, "remote", clock_of(&[("remote", 1)]));

        applier.apply(newer);
        assert_eq!(clock.lock().unwrap().get("remote"), 2);

        // The older op is dominated and skipped; even if it were applied,
        // the join could not move the clock backwards.
        applier.apply(older);
        assert_eq!(clock.lock().unwrap().get("remote"), 2);
        assert_eq!(storage.lock().unwrap().get("k").unwrap(), json!(2));
    }

    #[test]
    fn reconcile_kind_installs_server_clock() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(clock_of(&[("local", 1)])));
        let applier = applier(&storage, &clock);

        let mut op = SyncOperation::delete("ignored", 1, "server", clock_of(&[("server", 3)]));
        op.kind = OperationKind::Reconcile;
        op.server_clock = Some(clock_of(&[("local", 1), ("server", 3)]));
        applier.apply(op);

        let after = clock.lock().unwrap().clone();
        assert_eq!(after.get("server"), 3);
        assert_eq!(after.get("local"), 1);
        // The slot was not touched.
        assert!(storage.lock().unwrap().get("ignored").is_err());
    }

    #[test]
    fn vetoed_operations_are_skipped() {
        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let mut hooks = BusinessHooks::default();
        hooks.global = Some(Arc::new(|op: &SyncOperation| op.key != "forbidden"));
        let applier = OperationApplier::new(
            "local".into(),
            Arc::clone(&storage),
            Arc::clone(&clock),
            hooks,
            None,
        );

        applier.apply(SyncOperation::set(
            "forbidden",
            json!(1),
            1,
            "remote",
            clock_of(&[("remote", 1)]),
        ));
        applier.apply(SyncOperation::set(
            "allowed",
            json!(2),
            2,
            "remote",
            clock_of(&[("remote", 2)]),
        ));

        assert!(storage.lock().unwrap().get("forbidden").is_err());
        assert_eq!(storage.lock().unwrap().get("allowed").unwrap(), json!(2));
    }

    #[test]
    fn integrate_applies_server_choice_and_resolved_state() {
        use crate::protocol::{ReconciliationStatus, ReportedConflict};

        let storage = shared_storage();
        storage.lock().unwrap().set("k", json!("a")).unwrap();
        let clock = Arc::new(Mutex::new(clock_of(&[("c1", 1)])));
        let applier = applier(&storage, &clock);

        applier.integrate(ReconciliationResponse {
            id: "r".into(),
            status: ReconciliationStatus::Accepted,
            server_operations: None,
            resolved_state: Some(clock_of(&[("c1", 1), ("s1", 1)])),
            conflicts: Some(vec![ReportedConflict {
                key: "k".into(),
                client_value: Some(json!("a")),
                server_value: Some(json!("b")),
                resolution: ConflictResolution::Server,
            }]),
        });

        let after = clock.lock().unwrap().clone();
        assert_eq!(after.get("c1"), 1);
        assert_eq!(after.get("s1"), 1);
        assert_eq!(storage.lock().unwrap().get("k").unwrap(), json!("b"));
    }

    #[test]
    fn integrate_keeps_client_value_on_client_resolution() {
        use crate::protocol::{ReconciliationStatus, ReportedConflict};

        let storage = shared_storage();
        storage.lock().unwrap().set("k", json!("mine")).unwrap();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let applier = applier(&storage, &clock);

        applier.integrate(ReconciliationResponse {
            id: "r".into(),
            status: ReconciliationStatus::Conflict,
            server_operations: None,
            resolved_state: None,
            conflicts: Some(vec![ReportedConflict {
                key: "k".into(),
                client_value: Some(json!("mine")),
                server_value: Some(json!("theirs")),
                resolution: ConflictResolution::Client,
            }]),
        });

        assert_eq!(storage.lock().unwrap().get("k").unwrap(), json!("mine"));
    }

    #[test]
    fn merge_resolution_uses_the_installed_merger() {
        use crate::protocol::{ReconciliationStatus, ReportedConflict};

        let storage = shared_storage();
        let clock = Arc::new(Mutex::new(VectorClock::new()));
        let merger: ConflictMerger = Arc::new(|conflict| {
            let a = conflict.client_value.as_ref()?.as_i64()?;
            let b = conflict.server_value.as_ref()?.as_i64()?;
            Some(json!(a + b))
        });
        let applier = OperationApplier::new(
            "local".into(),
            Arc::clone(&storage),
            Arc::clone(&clock),
            BusinessHooks::default(),
            Some(merger),
        );

        let respond = |key: &str, client, server| ReconciliationResponse {
            id: "r".into(),
            status: ReconciliationStatus::Conflict,
            server_operations: None,
            resolved_state: None,
            conflicts: Some(vec![ReportedConflict {
                key: key.into(),
                client_value: client,
                server_value: server,
                resolution: ConflictResolution::Merge,
            }]),
        };

        applier.integrate(respond("sum", Some(json!(2)), Some(json!(3))));
        assert_eq!(storage.lock().unwrap().get("sum").unwrap(), json!(5));

        // When the merger abstains, merge degrades to the server value.
        applier.integrate(respond("fallback", Some(json!("a")), Some(json!("b"))));
        assert_eq!(
            storage.lock().unwrap().get("fallback").unwrap(),
            json!("b")
        );
    }
}
