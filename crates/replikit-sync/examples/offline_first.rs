//! Example: an offline-first todo app over a manual-sync replica.
//!
//! Everything here runs locally: writes go to storage, bump the replica's
//! clock, and broadcast change events. When a transport is added later,
//! the same collections start replicating without code changes.

use replikit_sync::{Replica, ReplicaConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let replica = Replica::open(ReplicaConfig::new("laptop"))?;

    // Watch every local commit.
    let mut events = replica.events();

    let todos = replica.list::<String>("todos");
    todos.append("pack for the trip".into()).await?;
    todos.append("water the plants".into()).await?;
    todos.insert_at(1, "book the train".into()).await?;

    println!("Todos:");
    for (i, todo) in todos.to_vec()?.iter().enumerate() {
        println!("  {}. {todo}", i + 1);
    }

    let done = replica.counter("done-count");
    done.increment(1).await?;
    println!("\nDone so far: {}", done.value()?);

    // Each write produced one change event.
    let mut seen = 0;
    while let Some(event) = events.try_recv() {
        seen += 1;
        println!("event {seen}: slot '{}' changed", event.key);
    }

    // The clock counts every local mutation.
    println!("\nClock: {} local events", replica.clock().get("laptop"));

    Ok(())
}
