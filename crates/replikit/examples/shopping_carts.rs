//! Example: shopping carts that survive going offline.
//!
//! Two devices edit the same cart independently and converge on sync.

use replikit::prelude::*;

fn main() {
    println!("=== Shared cart (tombstone set) ===\n");

    // Phone and laptop each hold a replica of the cart. Items are keyed
    // so the same product can be re-added after a removal.
    let mut phone: TombstoneSet<&str> = TombstoneSet::new();
    let mut laptop: TombstoneSet<&str> = TombstoneSet::new();

    // Offline edits on the phone.
    phone.insert("sku-101", "espresso beans", 1_000, "phone");
    phone.insert("sku-205", "grinder", 1_050, "phone");

    // Offline edits on the laptop.
    laptop.insert("sku-310", "kettle", 1_020, "laptop");
    laptop.remove("sku-205", 1_100, "laptop"); // saw it elsewhere, too pricey

    // Sync: merge both ways.
    phone.merge(&laptop);
    laptop.merge(&phone);

    println!("Cart after sync ({} items):", phone.len());
    for item in phone.values() {
        println!("  - {item}");
    }
    println!("Grinder removed everywhere: {}", !laptop.contains("sku-205"));

    // A later add on the laptop wins over the old removal.
    laptop.insert("sku-205", "grinder", 1_200, "laptop");
    phone.merge(&laptop);
    println!("Grinder re-added later: {}\n", phone.contains("sku-205"));

    println!("=== Cart totals (PN-Counter) ===\n");

    let mut phone_total = PNCounter::new();
    let mut laptop_total = PNCounter::new();

    phone_total.increment("phone", 3);
    laptop_total.increment("laptop", 2);
    laptop_total.decrement("laptop", 1);

    phone_total.merge(&laptop_total);
    laptop_total.merge(&phone_total);

    println!("Items counted on phone:  {}", phone_total.value());
    println!("Items counted on laptop: {}", laptop_total.value());

    println!("\n=== Causality (vector clocks) ===\n");

    let mut phone_clock = VectorClock::new();
    let mut laptop_clock = VectorClock::new();

    phone_clock.increment("phone");
    laptop_clock.increment("laptop");
    println!(
        "Independent edits are concurrent: {:?}",
        phone_clock.compare(&laptop_clock)
    );

    laptop_clock.merge(&phone_clock);
    laptop_clock.increment("laptop");
    println!(
        "After the laptop syncs and edits again: {:?}",
        phone_clock.compare(&laptop_clock)
    );
}
