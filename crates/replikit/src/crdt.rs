/// Core trait that all CRDTs must implement.
///
/// A CRDT (Conflict-free Replicated Data Type) guarantees that concurrent
/// updates on different replicas converge to the same state after merging,
/// without coordination or consensus.
///
/// # Properties
///
/// All implementations must satisfy, as observed through the type's query
/// methods:
/// - **Commutativity:** `a.merge(b) == b.merge(a)`
/// - **Associativity:** `a.merge(b.merge(c)) == a.merge(b).merge(c)`
/// - **Idempotency:** `a.merge(a) == a`
///
/// Together with mutators that only move state upward in the type's join
/// semilattice, these laws make merge safe to apply in any order and any
/// number of times — the delivery guarantees a replication layer needs.
pub trait Crdt {
    /// Merge another replica's state into this one.
    ///
    /// After merging, `self` holds the least upper bound of both states.
    fn merge(&mut self, other: &Self);
}
