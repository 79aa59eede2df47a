//! Example: collaborative ordered notes with an RGA.
//!
//! Two editors insert lines concurrently; both replicas converge to the
//! same document without coordination.

use replikit::prelude::*;

fn print_doc(label: &str, doc: &Rga<&str>) {
    println!("{label}:");
    for (i, line) in doc.iter().enumerate() {
        println!("  {}. {line}", i + 1);
    }
}

fn main() {
    // Ana drafts the agenda.
    let mut ana = Rga::new();
    ana.append("Welcome", 1_000, "ana");
    ana.append("Roadmap review", 1_001, "ana");
    ana.append("Wrap-up", 1_002, "ana");

    // Ben starts from Ana's draft.
    let mut ben = ana.clone();

    // Concurrent edits: Ana adds a budget item before the wrap-up, Ben
    // squeezes a demo in after the welcome.
    ana.insert_at(2, "Budget check", 1_100, "ana").unwrap();
    ben.insert_at(1, "Demo: sync engine", 1_120, "ben").unwrap();

    print_doc("Ana before sync", &ana);
    print_doc("Ben before sync", &ben);

    // Exchange states both ways.
    ana.merge(&ben);
    ben.merge(&ana);

    print_doc("\nConverged document", &ana);
    assert_eq!(ana.to_vec(), ben.to_vec());

    // Ben strikes the roadmap item; position math keeps the rest stable.
    let removed = ben.remove_at(2);
    println!("\nBen removed: {removed:?}");

    print_doc("Final document", &ben);
}
