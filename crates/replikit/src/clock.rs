//! Vector clocks for causal ordering across replicas.
//!
//! A [`VectorClock`] maps replica identifiers to event counters. Each
//! replica increments its own component on every local mutation; comparing
//! two clocks yields the causal relationship between the states that
//! produced them.
//!
//! The induced order is partial: two clocks where each side has seen events
//! the other has not are [`ClockOrdering::Concurrent`]. Equal clocks are
//! reported as `Concurrent` as well — the replication layer only acts on
//! `Less` (remote state strictly dominated by local state), so the two
//! cases never need to be distinguished.
//!
//! # Example
//!
//! ```
//! use replikit::clock::{ClockOrdering, VectorClock};
//!
//! let mut a = VectorClock::new();
//! a.increment("r1");
//!
//! let mut b = VectorClock::new();
//! b.increment("r2");
//!
//! // Independent histories are concurrent.
//! assert_eq!(a.compare(&b), ClockOrdering::Concurrent);
//!
//! // After b observes a's history, a is strictly in b's past.
//! b.merge(&a);
//! b.increment("r2");
//! assert_eq!(a.compare(&b), ClockOrdering::Less);
//! ```

use alloc::collections::BTreeMap;
use alloc::string::String;

/// Causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// Every component of `self` is ≤ the other's, at least one strictly.
    Less,
    /// Every component of `self` is ≥ the other's, at least one strictly.
    Greater,
    /// Neither dominates the other (this also covers equal clocks).
    Concurrent,
}

/// A vector clock: one event counter per replica.
///
/// Missing components are zero, so a fresh clock compares as `Less` than
/// any clock that has recorded an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock (all components zero).
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Get the counter for a replica. Missing replicas read as zero.
    #[must_use]
    pub fn get(&self, replica: &str) -> u64 {
        self.entries.get(replica).copied().unwrap_or(0)
    }

    /// Record one local event for `replica`.
    pub fn increment(&mut self, replica: &str) {
        *self.entries.entry(String::from(replica)).or_insert(0) += 1;
    }

    /// Compare two clocks under the causal partial order.
    ///
    /// Walks the union of components keeping two flags — "every component
    /// ≤ the other's" and "every component ≥ the other's" — and maps the
    /// surviving flag to [`ClockOrdering::Less`] or
    /// [`ClockOrdering::Greater`]. If both or neither survive, the clocks
    /// are [`ClockOrdering::Concurrent`].
    #[must_use]
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut all_less_or_equal = true;
        let mut all_greater_or_equal = true;

        for replica in self.entries.keys().chain(other.entries.keys()) {
            let ours = self.get(replica);
            let theirs = other.get(replica);
            if ours < theirs {
                all_greater_or_equal = false;
            }
            if ours > theirs {
                all_less_or_equal = false;
            }
        }

        match (all_less_or_equal, all_greater_or_equal) {
            (true, false) => ClockOrdering::Less,
            (false, true) => ClockOrdering::Greater,
            _ => ClockOrdering::Concurrent,
        }
    }

    /// Advance this clock to the componentwise maximum of both clocks.
    ///
    /// This is the join of the clock semilattice: after merging, `self`
    /// covers every event either clock had observed. Reconciliation uses it
    /// to compute resolved state, and the replication loop uses it to
    /// advance the local clock past an applied remote operation.
    pub fn merge(&mut self, other: &Self) {
        for (replica, &counter) in &other.entries {
            let entry = self.entries.entry(replica.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    /// Iterate over `(replica, counter)` components.
    pub fn components(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(r, &c)| (r.as_str(), c))
    }

    /// Number of replicas with a nonzero component.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no replica has recorded an event.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().filter(|&(_, c)| c > 0).collect(),
        }
    }
}
