use alloc::string::String;

use crate::Crdt;

/// A last-writer-wins register (LWW-Register).
///
/// The register holds one value together with the `(timestamp, replica)`
/// stamp of the write that produced it, the same stamp pair the keyed
/// sets use. Whichever side of a merge carries the lexicographically
/// larger stamp wins, so resolution is deterministic without extra
/// coordination; the timestamp dominates and the replica id only breaks
/// exact millisecond ties. Clock skew between replicas is acceptable: the
/// contract is convergence, not real-time ordering.
///
/// Stamps are supplied by the caller — the layer that owns the replica
/// identity and the wall clock (a collection facade, a test) stamps each
/// write, which also keeps the type usable without `std`.
///
/// # Example
///
/// ```
/// use replikit::prelude::*;
///
/// let mut title = LWWRegister::new("draft", 1_000, "a");
/// title.write("v2", 2_000, "b");
///
/// let other = LWWRegister::new("rewrite", 1_500, "c");
/// title.merge(&other); // loses: 1_500 < 2_000
///
/// assert_eq!(*title.value(), "v2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LWWRegister<T: Clone> {
    value: T,
    timestamp: i64,
    replica: String,
}

impl<T: Clone> LWWRegister<T> {
    /// Create a register holding `value`, stamped `(timestamp, replica)`.
    pub fn new(value: T, timestamp: i64, replica: impl Into<String>) -> Self {
        Self {
            value,
            timestamp,
            replica: replica.into(),
        }
    }

    /// Offer a write stamped `(timestamp, replica)`.
    ///
    /// The write takes effect only if its stamp is at least the current
    /// one — the same policy a merge applies, so a stale write is dropped
    /// here exactly as it would be dropped on any other replica. Returns
    /// whether the write won.
    pub fn write(&mut self, value: T, timestamp: i64, replica: impl Into<String>) -> bool {
        let replica = replica.into();
        if (timestamp, replica.as_str()) < self.stamp() {
            return false;
        }
        self.value = value;
        self.timestamp = timestamp;
        self.replica = replica;
        true
    }

    /// The current value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Timestamp of the winning write, in milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Replica that produced the winning write.
    #[must_use]
    pub fn replica(&self) -> &str {
        &self.replica
    }

    fn stamp(&self) -> (i64, &str) {
        (self.timestamp, &self.replica)
    }
}

impl<T: Clone> Crdt for LWWRegister<T> {
    fn merge(&mut self, other: &Self) {
        if other.stamp() > self.stamp() {
            *self = other.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_the_stamped_value() {
        let r = LWWRegister::new(42, 1, "a");
        assert_eq!(*r.value(), 42);
        assert_eq!(r.timestamp(), 1);
        assert_eq!(r.replica(), "a");
    }

    #[test]
    fn later_write_wins_and_restamps() {
        let mut r = LWWRegister::new("old", 100, "a");
        assert!(r.write("new", 200, "b"));
        assert_eq!(*r.value(), "new");
        assert_eq!(r.replica(), "b");
    }

    #[test]
    fn stale_write_is_dropped() {
        let mut r = LWWRegister::new("current", 200, "b");
        assert!(!r.write("stale", 100, "a"));
        assert_eq!(*r.value(), "current");
        assert_eq!(r.stamp(), (200, "b"));
    }

    #[test]
    fn same_replica_overwrites_within_one_millisecond() {
        let mut r = LWWRegister::new(1, 100, "a");
        assert!(r.write(2, 100, "a"));
        assert_eq!(*r.value(), 2);
    }

    #[test]
    fn write_and_merge_agree_on_ties() {
        // A write that ties on timestamp wins or loses by replica id,
        // exactly as the merge would decide it.
        let mut r = LWWRegister::new("mine", 100, "b");
        assert!(!r.write("theirs", 100, "a"));

        let mut merged = LWWRegister::new("mine", 100, "b");
        merged.merge(&LWWRegister::new("theirs", 100, "a"));
        assert_eq!(*merged.value(), "mine");
    }

    #[test]
    fn merge_picks_the_larger_stamp() {
        let mut r1 = LWWRegister::new("first", 100, "a");
        let r2 = LWWRegister::new("second", 200, "b");

        r1.merge(&r2);
        assert_eq!(*r1.value(), "second");

        // The other direction leaves the winner in place.
        let mut r2 = LWWRegister::new("second", 200, "b");
        r2.merge(&LWWRegister::new("first", 100, "a"));
        assert_eq!(*r2.value(), "second");
    }

    #[test]
    fn exact_tie_resolves_identically_in_both_directions() {
        let r1 = LWWRegister::new("v1", 1000, "a");
        let r2 = LWWRegister::new("v2", 1000, "b");

        let mut left = r1.clone();
        left.merge(&r2);
        let mut right = r2.clone();
        right.merge(&r1);

        assert_eq!(left, right);
        assert_eq!(*left.value(), "v2");
        assert_eq!(left.replica(), "b");
    }

    #[test]
    fn repeated_merge_changes_nothing() {
        let mut r1 = LWWRegister::new("x", 1, "a");
        let r2 = LWWRegister::new("y", 2, "b");

        r1.merge(&r2);
        let snapshot = r1.clone();
        r1.merge(&r2);
        r1.merge(&snapshot);

        assert_eq!(r1, snapshot);
    }
}
