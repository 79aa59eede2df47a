//! Example: a replica syncing over WebSocket.
//!
//! Point it at a sync server (`SYNC_URL`, default
//! `ws://localhost:4000/sync`) and it will connect, write a few slots,
//! and let the background loops pull and reconcile.

use std::time::Duration;

use replikit_sync::{Replica, ReplicaConfig, SyncStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let url = std::env::var("SYNC_URL").unwrap_or_else(|_| "ws://localhost:4000/sync".into());
    let replica_id = std::env::var("REPLICA_ID").unwrap_or_else(|_| "demo-client".into());

    let replica = Replica::open(
        ReplicaConfig::new(&replica_id)
            .with_websocket(&url)
            .with_auto_sync(Duration::from_secs(2)),
    )?;

    // Log status transitions in the background.
    let mut status = replica.status();
    tokio::spawn(async move {
        while let Some(state) = status.next().await {
            let label = match state {
                SyncStatus::Online => "online",
                SyncStatus::Offline => "offline",
                SyncStatus::Syncing => "syncing",
            };
            println!("[status] {label}");
        }
    });

    // Surface server-reported conflicts.
    let mut conflicts = replica.conflicts();
    tokio::spawn(async move {
        while let Some(conflict) = conflicts.next().await {
            println!("[conflict] key '{}' diverged", conflict.key);
        }
    });

    println!("connecting to {url} as '{replica_id}'");
    replica.connect().await?;

    // Local writes replicate as they happen; offline writes queue and
    // ride with the next reconciliation round.
    let presence = replica.register::<String>("presence");
    presence.set_value(format!("{replica_id} was here")).await?;

    let visits = replica.counter("visits");
    visits.increment(1).await?;

    // Let the auto-sync loops run for a bit.
    tokio::time::sleep(Duration::from_secs(10)).await;

    println!("visits seen across replicas: {}", visits.value()?);
    println!("queued for reconciliation: {}", replica.queued_operations());

    replica.disconnect().await;
    Ok(())
}
