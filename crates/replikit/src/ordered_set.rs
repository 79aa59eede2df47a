use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;

use crate::Crdt;

/// A keyed set with permanent tombstones, iterated in timestamp order.
///
/// Like [`TombstoneSet`](crate::TombstoneSet) but simpler: once an id is
/// removed it stays removed, even if an add with a later timestamp arrives.
/// Entries still carry a `(timestamp, replica)` stamp so concurrent adds of
/// the same id resolve deterministically and iteration order is stable
/// across replicas.
///
/// # Example
///
/// ```
/// use replikit::prelude::*;
///
/// let mut s = OrderedSet::new();
/// s.insert("m1", "first", 100, "a");
/// s.insert("m2", "second", 200, "a");
/// s.remove("m1");
///
/// assert_eq!(s.values(), [&"second"]);
/// s.insert("m1", "again", 300, "a"); // ignored: tombstone is permanent
/// assert!(!s.contains("m1"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderedSet<T: Clone> {
    entries: BTreeMap<String, OrderedEntry<T>>,
    tombstones: BTreeSet<String>,
}

// Hand-written so `T` needs no `Default` bound.
impl<T: Clone> Default for OrderedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct OrderedEntry<T> {
    value: T,
    timestamp: i64,
    replica: String,
}

impl<T> OrderedEntry<T> {
    fn stamp(&self) -> (i64, &str) {
        (self.timestamp, &self.replica)
    }
}

impl<T: Clone> OrderedSet<T> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    /// Add `value` under `id`, stamped `(timestamp, replica)`.
    ///
    /// Refused (returns `false`) if the id is tombstoned or an entry with a
    /// larger stamp is already present.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        value: T,
        timestamp: i64,
        replica: impl Into<String>,
    ) -> bool {
        let id = id.into();
        let replica = replica.into();

        if self.tombstones.contains(&id) {
            return false;
        }
        if let Some(existing) = self.entries.get(&id) {
            if existing.stamp() >= (timestamp, replica.as_str()) {
                return false;
            }
        }

        self.entries.insert(
            id,
            OrderedEntry {
                value,
                timestamp,
                replica,
            },
        );
        true
    }

    /// Remove `id`, permanently.
    ///
    /// The tombstone is recorded even when the id was never seen here.
    /// Returns `true` if an entry was visible before the call.
    pub fn remove(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        let removed = self.entries.remove(&id).is_some();
        self.tombstones.insert(id);
        removed
    }

    /// Whether `id` is visible.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id) && !self.tombstones.contains(id)
    }

    /// The visible value under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        if self.tombstones.contains(id) {
            return None;
        }
        self.entries.get(id).map(|entry| &entry.value)
    }

    /// Number of visible elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no element is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visible values in ascending `(timestamp, replica)` order.
    #[must_use]
    pub fn values(&self) -> Vec<&T> {
        let mut visible: Vec<&OrderedEntry<T>> = self.entries.values().collect();
        visible.sort_by(|a, b| a.stamp().cmp(&b.stamp()));
        visible.into_iter().map(|entry| &entry.value).collect()
    }

    /// Visible ids in ascending `(timestamp, replica)` order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut visible: Vec<(&str, &OrderedEntry<T>)> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.as_str(), entry))
            .collect();
        visible.sort_by(|a, b| a.1.stamp().cmp(&b.1.stamp()));
        visible.into_iter().map(|(id, _)| id).collect()
    }
}

impl<T: Clone> Crdt for OrderedSet<T> {
    fn merge(&mut self, other: &Self) {
        for (id, entry) in &other.entries {
            match self.entries.get_mut(id) {
                Some(existing) if existing.stamp() >= entry.stamp() => {}
                Some(existing) => *existing = entry.clone(),
                None => {
                    self.entries.insert(id.clone(), entry.clone());
                }
            }
        }

        self.tombstones.extend(other.tombstones.iter().cloned());

        let tombstones = &self.tombstones;
        self.entries.retain(|id, _| !tombstones.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_set_is_empty() {
        let s = OrderedSet::<u32>::new();
        assert!(s.is_empty());
    }

    #[test]
    fn insert_and_get() {
        let mut s = OrderedSet::new();
        assert!(s.insert("a", 10, 100, "r1"));
        assert_eq!(s.get("a"), Some(&10));
        assert!(s.contains("a"));
    }

    #[test]
    fn tombstone_is_permanent() {
        let mut s = OrderedSet::new();
        s.insert("a", 10, 100, "r1");
        assert!(s.remove("a"));
        assert!(!s.contains("a"));

        // Even a much later add is ignored.
        assert!(!s.insert("a", 20, 10_000, "r1"));
        assert!(!s.contains("a"));
    }

    #[test]
    fn newer_stamp_wins_for_same_id() {
        let mut s = OrderedSet::new();
        s.insert("a", 1, 100, "r1");
        assert!(s.insert("a", 2, 100, "r2")); // same ts, larger replica
        assert_eq!(s.get("a"), Some(&2));
        assert!(!s.insert("a", 3, 100, "r1"));
    }

    #[test]
    fn values_in_timestamp_order() {
        let mut s = OrderedSet::new();
        s.insert("x", 'x', 300, "r1");
        s.insert("y", 'y', 100, "r1");
        s.insert("z", 'z', 200, "r1");

        assert_eq!(s.values(), [&'y', &'z', &'x']);
        assert_eq!(s.ids(), ["y", "z", "x"]);
    }

    #[test]
    fn merge_unions_tombstones() {
        let mut s1 = OrderedSet::new();
        s1.insert("a", 1, 100, "r1");

        let mut s2 = OrderedSet::new();
        s2.insert("a", 1, 100, "r1");
        s2.remove("a");

        let mut left = s1.clone();
        left.merge(&s2);
        assert!(!left.contains("a"));

        let mut right = s2.clone();
        right.merge(&s1);
        assert!(!right.contains("a"));
        assert_eq!(left, right);
    }

    #[test]
    fn merge_keeps_latest_entry() {
        let mut s1 = OrderedSet::new();
        s1.insert("a", 1, 100, "r1");

        let mut s2 = OrderedSet::new();
        s2.insert("a", 2, 200, "r2");

        s1.merge(&s2);
        assert_eq!(s1.get("a"), Some(&2));
    }

    #[test]
    fn merge_is_commutative() {
        let mut s1 = OrderedSet::new();
        s1.insert("a", 1, 100, "r1");
        s1.remove("b");

        let mut s2 = OrderedSet::new();
        s2.insert("b", 2, 150, "r2");
        s2.insert("c", 3, 50, "r2");

        let mut left = s1.clone();
        left.merge(&s2);

        let mut right = s2.clone();
        right.merge(&s1);

        assert_eq!(left, right);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut s1 = OrderedSet::new();
        s1.insert("a", 1, 100, "r1");

        let mut s2 = OrderedSet::new();
        s2.insert("b", 2, 200, "r2");
        s2.remove("a");

        s1.merge(&s2);
        let after_first = s1.clone();
        s1.merge(&s2);

        assert_eq!(s1, after_first);
    }
}
