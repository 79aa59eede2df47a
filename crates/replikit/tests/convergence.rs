//! Integration tests verifying CRDT convergence properties.
//!
//! For any CRDT, merging replicas in any order must produce the same result.

use replikit::prelude::*;

#[test]
fn gcounter_three_way_convergence() {
    let mut a = GCounter::new();
    let mut b = GCounter::new();
    let mut c = GCounter::new();

    a.increment("a", 10);
    b.increment("b", 20);
    c.increment("c", 30);

    let mut order1 = a.clone();
    order1.merge(&b);
    order1.merge(&c);

    let mut order2 = c.clone();
    order2.merge(&a);
    order2.merge(&b);

    let mut order3 = b.clone();
    order3.merge(&c);
    order3.merge(&a);

    assert_eq!(order1.value(), 60);
    assert_eq!(order2.value(), 60);
    assert_eq!(order3.value(), 60);
}

#[test]
fn pncounter_convergence_with_concurrent_ops() {
    let mut c1 = PNCounter::new();
    c1.increment("r1", 5);
    c1.decrement("r1", 2);

    let mut c2 = PNCounter::new();
    c2.increment("r2", 3);
    c2.decrement("r2", 1);

    let mut ab = c1.clone();
    ab.merge(&c2);

    let mut ba = c2.clone();
    ba.merge(&c1);

    assert_eq!(ab.value(), ba.value());
    assert_eq!(ab.value(), 5); // (5 - 2) + (3 - 1)
}

#[test]
fn lww_register_exact_tie_resolves_identically_everywhere() {
    let r1 = LWWRegister::new("v1", 1000, "a");
    let r2 = LWWRegister::new("v2", 1000, "b");

    let mut merged1 = r1.clone();
    merged1.merge(&r2);

    let mut merged2 = r2.clone();
    merged2.merge(&r1);

    assert_eq!(*merged1.value(), "v2");
    assert_eq!(*merged2.value(), "v2");
}

#[test]
fn twopset_blocks_resurrection() {
    let mut s = TwoPSet::new();
    s.insert("x");
    s.remove(&"x");
    s.insert("x");

    assert!(!s.contains(&"x"));
    assert!(s.values().is_empty());
}

#[test]
fn gset_union_convergence() {
    let sets: Vec<GSet<u32>> = (0..5)
        .map(|i| ((i * 10)..((i + 1) * 10)).collect())
        .collect();

    let mut result = sets[0].clone();
    for s in &sets[1..] {
        result.merge(s);
    }

    assert_eq!(result.len(), 50);
    for i in 0..50 {
        assert!(result.contains(&i), "missing element {i}");
    }
}

#[test]
fn rga_interleaved_edits_converge() {
    let mut r1 = Rga::new();
    r1.append("a", 100, "r1");
    r1.append("c", 101, "r1");
    r1.insert_at(1, "b", 102, "r1").unwrap();
    assert_eq!(r1.to_vec(), ["a", "b", "c"]);

    let mut r2 = Rga::new();
    r2.append("z", 100, "r2");

    let mut left = r1.clone();
    left.merge(&r2);

    let mut right = r2.clone();
    right.merge(&r1);

    assert_eq!(left.to_vec(), right.to_vec());
    assert_eq!(left.len(), 4);
}

#[test]
fn tombstone_set_full_exchange_converges() {
    let mut s1 = TombstoneSet::new();
    s1.insert("a", "alpha", 100, "r1");
    s1.insert("b", "beta", 110, "r1");
    s1.remove("b", 140, "r1");

    let mut s2 = TombstoneSet::new();
    s2.insert("b", "brand-new", 150, "r2");
    s2.insert("c", "gamma", 120, "r2");
    s2.remove("a", 90, "r2"); // older than the add, must lose

    let mut left = s1.clone();
    left.merge(&s2);

    let mut right = s2.clone();
    right.merge(&s1);

    assert_eq!(left, right);
    assert!(left.contains("a"));
    assert_eq!(left.get("b"), Some(&"brand-new"));
    assert!(left.contains("c"));
}

#[test]
fn ormap_full_exchange_converges() {
    let mut m1 = ORMap::new();
    m1.put("x", 1, 100, "r1");
    m1.put("y", 2, 110, "r1");
    m1.remove("y", 130, "r1");

    let mut m2 = ORMap::new();
    m2.put("y", 3, 120, "r2");
    m2.put("z", 4, 140, "r2");

    let mut left = m1.clone();
    left.merge(&m2);

    let mut right = m2.clone();
    right.merge(&m1);

    assert_eq!(left, right);
    assert_eq!(left.get("x"), Some(&1));
    assert_eq!(left.get("y"), None); // removal at 130 is the latest activity
    assert_eq!(left.get("z"), Some(&4));
}

#[test]
fn repeated_merge_is_idempotent() {
    let mut a = OrderedSet::new();
    a.insert("1", 'a', 100, "r1");
    a.insert("2", 'b', 110, "r1");

    let mut b = OrderedSet::new();
    b.insert("2", 'c', 120, "r2");
    b.insert("3", 'd', 130, "r2");

    a.merge(&b);
    let snapshot = a.clone();

    a.merge(&b);
    assert_eq!(a, snapshot, "merge should be idempotent");

    a.merge(&b);
    assert_eq!(a, snapshot, "merge should be idempotent (3rd time)");
}
