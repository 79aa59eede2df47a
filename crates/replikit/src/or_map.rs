use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::Crdt;

/// An observed-remove map (OR-Map).
///
/// Every key carries its full add/remove provenance: the timestamp it was
/// last put, the timestamp it was removed (if it was), and the replica that
/// performed the latest action. A key is visible while its removal stamp is
/// absent. Merge keeps, per key, the side whose latest activity
/// (`removed` if present, else `added`) is greater; ties fall back to the
/// replica id and then prefer the removal, so both directions agree.
///
/// # Example
///
/// ```
/// use replikit::prelude::*;
///
/// let mut m = ORMap::new();
/// m.put("color", "red", 100, "a");
/// m.put("size", "large", 150, "a");
/// m.remove("color", 200, "a");
///
/// assert_eq!(m.get("color"), None);
/// assert_eq!(m.get("size"), Some(&"large"));
///
/// // A put after a remove makes the key visible again.
/// m.put("color", "blue", 300, "a");
/// assert_eq!(m.get("color"), Some(&"blue"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ORMap<T: Clone> {
    entries: BTreeMap<String, MapEntry<T>>,
}

// Hand-written so `T` needs no `Default` bound.
impl<T: Clone> Default for ORMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct MapEntry<T> {
    value: T,
    added: i64,
    removed: Option<i64>,
    replica: String,
}

impl<T> MapEntry<T> {
    /// Timestamp of the latest action on this key.
    fn activity(&self) -> i64 {
        self.removed.unwrap_or(self.added)
    }

    /// Total order used by merge: activity, then replica, then
    /// removed-beats-present on an exact tie.
    fn precedence(&self) -> (i64, &str, bool) {
        (self.activity(), &self.replica, self.removed.is_some())
    }
}

impl<T: Clone> ORMap<T> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Put `value` under `key`, stamped `(timestamp, replica)`.
    ///
    /// Overwrites any previous state for the key, including a removal.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        value: T,
        timestamp: i64,
        replica: impl Into<String>,
    ) {
        self.entries.insert(
            key.into(),
            MapEntry {
                value,
                added: timestamp,
                removed: None,
                replica: replica.into(),
            },
        );
    }

    /// Remove `key`, stamped `(timestamp, replica)`.
    ///
    /// No-op (returns `false`) if the key is missing or already removed.
    pub fn remove(&mut self, key: &str, timestamp: i64, replica: impl Into<String>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.removed.is_none() => {
                entry.removed = Some(timestamp);
                entry.replica = replica.into();
                true
            }
            _ => false,
        }
    }

    /// The visible value under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries
            .get(key)
            .filter(|entry| entry.removed.is_none())
            .map(|entry| &entry.value)
    }

    /// Whether `key` is visible.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of visible keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.removed.is_none())
            .count()
    }

    /// Whether no key is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over visible `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.removed.is_none())
            .map(|(key, entry)| (key.as_str(), &entry.value))
    }

    /// Visible keys in key order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.iter().map(|(key, _)| key).collect()
    }
}

impl<T: Clone> Crdt for ORMap<T> {
    fn merge(&mut self, other: &Self) {
        for (key, entry) in &other.entries {
            match self.entries.get_mut(key) {
                Some(existing) if existing.precedence() >= entry.precedence() => {}
                Some(existing) => *existing = entry.clone(),
                None => {
                    self.entries.insert(key.clone(), entry.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_map_is_empty() {
        let m = ORMap::<u32>::new();
        assert!(m.is_empty());
        assert_eq!(m.get("a"), None);
    }

    #[test]
    fn put_and_get() {
        let mut m = ORMap::new();
        m.put("a", 1, 100, "r1");
        assert_eq!(m.get("a"), Some(&1));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn remove_hides_key() {
        let mut m = ORMap::new();
        m.put("a", 1, 100, "r1");
        assert!(m.remove("a", 200, "r1"));
        assert_eq!(m.get("a"), None);
        assert!(m.is_empty());
    }

    #[test]
    fn remove_missing_or_removed_is_noop() {
        let mut m = ORMap::<u32>::new();
        assert!(!m.remove("a", 100, "r1"));

        m.put("a", 1, 100, "r1");
        m.remove("a", 200, "r1");
        assert!(!m.remove("a", 300, "r1"));
    }

    #[test]
    fn put_after_remove_resurrects() {
        let mut m = ORMap::new();
        m.put("a", 1, 100, "r1");
        m.remove("a", 200, "r1");
        m.put("a", 2, 300, "r1");
        assert_eq!(m.get("a"), Some(&2));
    }

    #[test]
    fn merge_keeps_latest_activity() {
        let mut m1 = ORMap::new();
        m1.put("a", 1, 100, "r1");

        let mut m2 = ORMap::new();
        m2.put("a", 2, 200, "r2");

        let mut left = m1.clone();
        left.merge(&m2);
        assert_eq!(left.get("a"), Some(&2));

        let mut right = m2.clone();
        right.merge(&m1);
        assert_eq!(right.get("a"), Some(&2));
    }

    #[test]
    fn merge_removal_beats_older_put() {
        let mut m1 = ORMap::new();
        m1.put("a", 1, 100, "r1");
        m1.remove("a", 200, "r1");

        let mut m2 = ORMap::new();
        m2.put("a", 2, 150, "r2");

        let mut left = m1.clone();
        left.merge(&m2);
        assert_eq!(left.get("a"), None);

        let mut right = m2.clone();
        right.merge(&m1);
        assert_eq!(right.get("a"), None);
    }

    #[test]
    fn merge_put_beats_older_removal() {
        let mut m1 = ORMap::new();
        m1.put("a", 1, 100, "r1");
        m1.remove("a", 150, "r1");

        let mut m2 = ORMap::new();
        m2.put("a", 2, 200, "r2");

        let mut left = m1.clone();
        left.merge(&m2);
        assert_eq!(left.get("a"), Some(&2));
    }

    #[test]
    fn merge_same_millisecond_is_deterministic() {
        let mut m1 = ORMap::new();
        m1.put("a", 1, 100, "r1");

        let mut m2 = ORMap::new();
        m2.put("a", 2, 100, "r2");

        let mut left = m1.clone();
        left.merge(&m2);

        let mut right = m2.clone();
        right.merge(&m1);

        // Larger replica id wins the tie in both directions.
        assert_eq!(left, right);
        assert_eq!(left.get("a"), Some(&2));
    }

    #[test]
    fn merge_is_commutative() {
        let mut m1 = ORMap::new();
        m1.put("a", 1, 100, "r1");
        m1.put("b", 2, 200, "r1");
        m1.remove("b", 250, "r1");

        let mut m2 = ORMap::new();
        m2.put("b", 3, 220, "r2");
        m2.put("c", 4, 50, "r2");

        let mut left = m1.clone();
        left.merge(&m2);

        let mut right = m2.clone();
        right.merge(&m1);

        assert_eq!(left, right);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut m1 = ORMap::new();
        m1.put("a", 1, 100, "r1");

        let mut m2 = ORMap::new();
        m2.put("b", 2, 200, "r2");
        m2.remove("b", 300, "r2");

        m1.merge(&m2);
        let after_first = m1.clone();
        m1.merge(&m2);

        assert_eq!(m1, after_first);
    }

    #[test]
    fn iter_skips_removed_keys() {
        let mut m = ORMap::new();
        m.put("a", 1, 100, "r1");
        m.put("b", 2, 110, "r1");
        m.remove("a", 200, "r1");

        let pairs: Vec<(&str, &i32)> = m.iter().collect();
        assert_eq!(pairs, [("b", &2)]);
        assert_eq!(m.keys(), ["b"]);
    }
}
