use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::Crdt;

/// A grow-only counter (G-Counter).
///
/// Keeps one monotonically increasing count per replica; the counter value
/// is the sum over all replicas. Merge takes the per-replica maximum, so
/// increments are never lost and never double-counted.
///
/// The acting replica is passed to [`increment`](GCounter::increment)
/// rather than stored in the counter — the layer that owns the replica
/// identity (a collection facade, a test) supplies it per call.
///
/// # Example
///
/// ```
/// use replikit::prelude::*;
///
/// let mut c1 = GCounter::new();
/// c1.increment("device-1", 2);
///
/// let mut c2 = GCounter::new();
/// c2.increment("device-2", 3);
///
/// c1.merge(&c2);
/// assert_eq!(c1.value(), 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GCounter {
    counts: BTreeMap<String, u64>,
}

impl GCounter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Add `amount` to `replica`'s component.
    pub fn increment(&mut self, replica: &str, amount: u64) {
        *self.counts.entry(String::from(replica)).or_insert(0) += amount;
    }

    /// Total across all replicas.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The contribution of a single replica.
    #[must_use]
    pub fn get(&self, replica: &str) -> u64 {
        self.counts.get(replica).copied().unwrap_or(0)
    }

    /// Iterate over `(replica, count)` components.
    pub fn components(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(r, &c)| (r.as_str(), c))
    }
}

impl Crdt for GCounter {
    fn merge(&mut self, other: &Self) {
        for (replica, &count) in &other.counts {
            let entry = self.counts.entry(replica.clone()).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
    }
}
