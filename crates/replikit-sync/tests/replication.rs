//! Replication behavior through the public `Replica` API: causality
//! filtering, causal exchange between replicas, and reconciliation
//! integration.

use replikit::prelude::*;
use replikit_sync::{
    ConflictResolution, ReconciliationResponse, ReconciliationStatus, Replica, ReplicaConfig,
    ReportedConflict, SyncOperation,
};
use serde_json::json;

fn clock_of(components: &[(&str, u64)]) -> VectorClock {
    components
        .iter()
        .map(|&(r, c)| (r.to_string(), c))
        .collect()
}

/// The `Set` operation a replica would emit for its current slot state.
fn op_for_slot(replica: &Replica, key: &str, timestamp: i64) -> SyncOperation {
    SyncOperation::set(
        key,
        replica.slot_value(key).expect("slot should exist"),
        timestamp,
        replica.replica_id(),
        replica.clock(),
    )
}

#[tokio::test]
async fn own_operations_are_never_reapplied() {
    let replica = Replica::open(ReplicaConfig::new("a")).unwrap();
    let set = replica.gset::<String>("tags");
    set.add("local".into()).await.unwrap();
    let clock_before = replica.clock();

    // An operation stamped with our own replica id must be skipped even
    // though its clock is ahead of ours.
    let echoed = SyncOperation::set(
        "tags",
        json!({"elements": ["remote-echo"]}),
        1,
        "a",
        clock_of(&[("a", 99)]),
    );
    replica.apply_remote_operations(vec![echoed]);

    assert_eq!(set.values().unwrap(), ["local"]);
    assert_eq!(replica.clock(), clock_before);
}

#[tokio::test]
async fn dominated_operations_are_skipped() {
    let replica = Replica::open(ReplicaConfig::new("a")).unwrap();
    let register = replica.register::<String>("title");
    register.set_value("current".into()).await.unwrap();

    // Seed the local clock with knowledge of b's first two events.
    replica.apply_remote_operations(vec![SyncOperation::set(
        "other",
        json!(1),
        1,
        "b",
        clock_of(&[("b", 2)]),
    )]);

    // A stale op from b (clock strictly behind local) must be skipped.
    let stale = SyncOperation::set("title", json!("stale"), 2, "b", clock_of(&[("b", 1)]));
    replica.apply_remote_operations(vec![stale]);

    assert_eq!(register.get_value().unwrap(), Some("current".to_string()));
}

#[tokio::test]
async fn applying_a_batch_twice_is_a_noop() {
    let replica = Replica::open(ReplicaConfig::new("a")).unwrap();
    let batch = vec![
        SyncOperation::set("k1", json!("v1"), 1, "b", clock_of(&[("b", 1)])),
        SyncOperation::set("k2", json!("v2"), 2, "b", clock_of(&[("b", 2)])),
    ];

    replica.apply_remote_operations(batch.clone());
    let clock_after_first = replica.clock();

    replica.apply_remote_operations(batch);
    assert_eq!(replica.clock(), clock_after_first);
    assert_eq!(replica.slot_value("k1"), Some(json!("v1")));
    assert_eq!(replica.slot_value("k2"), Some(json!("v2")));
}

#[tokio::test]
async fn causal_exchange_converges() {
    let a = Replica::open(ReplicaConfig::new("a")).unwrap();
    let b = Replica::open(ReplicaConfig::new("b")).unwrap();

    // a writes, then ships its state to b.
    a.gset::<String>("fruits").add("apple".into()).await.unwrap();
    b.apply_remote_operations(vec![op_for_slot(&a, "fruits", 1)]);

    // b mutates on top of what it received, then ships back.
    b.gset::<String>("fruits").add("banana".into()).await.unwrap();
    a.apply_remote_operations(vec![op_for_slot(&b, "fruits", 2)]);

    let on_a = a.gset::<String>("fruits").values().unwrap();
    let on_b = b.gset::<String>("fruits").values().unwrap();
    assert_eq!(on_a, on_b);
    assert_eq!(on_a, ["apple", "banana"]);

    // Both replicas have seen one event from each side.
    assert_eq!(a.clock().get("a"), 1);
    assert_eq!(a.clock().get("b"), 1);
    assert_eq!(b.clock().get("a"), 1);
    assert_eq!(b.clock().get("b"), 1);
}

#[tokio::test]
async fn counter_exchange_converges_to_the_sum() {
    let a = Replica::open(ReplicaConfig::new("a")).unwrap();
    let b = Replica::open(ReplicaConfig::new("b")).unwrap();

    let ca = a.counter("hits");
    ca.increment(5).await.unwrap();
    ca.decrement(2).await.unwrap();
    b.apply_remote_operations(vec![op_for_slot(&a, "hits", 1)]);

    let cb = b.counter("hits");
    cb.increment(3).await.unwrap();
    cb.decrement(1).await.unwrap();
    a.apply_remote_operations(vec![op_for_slot(&b, "hits", 2)]);

    assert_eq!(a.counter("hits").value().unwrap(), 5);
    assert_eq!(b.counter("hits").value().unwrap(), 5);
}

#[tokio::test]
async fn reconcile_happy_path_installs_state_and_resolutions() {
    // Client with clock {c1:1} integrates a response carrying an
    // authoritative clock and a server-resolved key.
    let replica = Replica::open(ReplicaConfig::new("c1")).unwrap();
    replica
        .register::<String>("seed")
        .set_value("x".into())
        .await
        .unwrap();
    assert_eq!(replica.clock(), clock_of(&[("c1", 1)]));

    replica.integrate_reconciliation(ReconciliationResponse {
        id: "round-1".into(),
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

    assert_eq!(replica.clock(), clock_of(&[("c1", 1), ("s1", 1)]));
    assert_eq!(replica.slot_value("k"), Some(json!("b")));
}

#[tokio::test]
async fn reconcile_integration_applies_server_operations() {
    let replica = Replica::open(ReplicaConfig::new("c1")).unwrap();

    replica.integrate_reconciliation(ReconciliationResponse {
        id: "round-2".into(),
        status: ReconciliationStatus::Accepted,
        server_operations: Some(vec![SyncOperation::set(
            "inventory",
            json!({"counts": 3}),
            1,
            "s1",
            clock_of(&[("s1", 4)]),
        )]),
        resolved_state: None,
        conflicts: None,
    });

    assert_eq!(replica.slot_value("inventory"), Some(json!({"counts": 3})));
    assert_eq!(replica.clock().get("s1"), 4);
}

#[tokio::test]
async fn manual_sync_now_is_the_identity() {
    let replica = Replica::open(ReplicaConfig::new("solo")).unwrap();
    let list = replica.list::<String>("log");
    list.append("entry".into()).await.unwrap();
    let clock_before = replica.clock();

    replica.sync_now().await.unwrap();

    assert_eq!(list.to_vec().unwrap(), ["entry"]);
    assert_eq!(replica.clock(), clock_before);
    assert_eq!(replica.queued_operations(), 0);
}

#[tokio::test]
async fn vetoed_collections_reject_remote_operations() {
    use std::sync::Arc;

    let config = ReplicaConfig::new("a").with_collection_hook(
        "audit",
        Arc::new(|_op: &SyncOperation| false),
    );
    let replica = Replica::open(config).unwrap();

    replica.apply_remote_operations(vec![
        SyncOperation::set("audit", json!("forbidden"), 1, "b", clock_of(&[("b", 1)])),
        SyncOperation::set("notes", json!("fine"), 2, "b", clock_of(&[("b", 2)])),
    ]);

    assert_eq!(replica.slot_value("audit"), None);
    assert_eq!(replica.slot_value("notes"), Some(json!("fine")));
}

#[tokio::test]
async fn change_events_are_broadcast_per_write() {
    let replica = Replica::open(ReplicaConfig::new("a")).unwrap();
    let mut events = replica.events();

    let set = replica.gset::<i32>("numbers");
    set.add(1).await.unwrap();
    set.add(2).await.unwrap();

    let first = events.recv().await.unwrap();
    assert_eq!(first.key, "numbers");
    let second = events.recv().await.unwrap();
    assert_eq!(second.key, "numbers");
    assert_ne!(first.value, second.value);
}
