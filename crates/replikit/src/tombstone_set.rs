use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::Crdt;

/// A keyed set whose removals can be superseded by later adds.
///
/// Elements are keyed by an externally supplied `id`, which lets several
/// values for the same logical slot coexist across replicas. Both entries
/// and tombstones carry a `(timestamp, replica)` stamp; the lexicographically
/// larger stamp dominates, so an add issued after a removal resurrects the
/// id, and a removal issued after an add suppresses it — deterministically,
/// on every replica.
///
/// Compare [`OrderedSet`](crate::OrderedSet), where tombstones are
/// permanent.
///
/// # Example
///
/// ```
/// use replikit::prelude::*;
///
/// let mut s = TombstoneSet::new();
/// s.insert("task-1", "write docs", 100, "a");
/// s.remove("task-1", 200, "a");
/// assert!(!s.contains("task-1"));
///
/// // A later add brings the id back.
/// s.insert("task-1", "write more docs", 300, "a");
/// assert!(s.contains("task-1"));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TombstoneSet<T: Clone> {
    entries: BTreeMap<String, Entry<T>>,
    tombstones: BTreeMap<String, Tombstone>,
}

// Hand-written so `T` needs no `Default` bound.
impl<T: Clone> Default for TombstoneSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Entry<T> {
    value: T,
    timestamp: i64,
    replica: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct Tombstone {
    timestamp: i64,
    replica: String,
}

impl<T: Clone> Entry<T> {
    fn stamp(&self) -> (i64, &str) {
        (self.timestamp, &self.replica)
    }
}

impl Tombstone {
    fn stamp(&self) -> (i64, &str) {
        (self.timestamp, &self.replica)
    }
}

impl<T: Clone> TombstoneSet<T> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeMap::new(),
        }
    }

    /// Add `value` under `id`, stamped `(timestamp, replica)`.
    ///
    /// Skipped (returns `false`) if a tombstone at least as recent exists,
    /// or if an entry with a larger stamp is already present.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        value: T,
        timestamp: i64,
        replica: impl Into<String>,
    ) -> bool {
        let id = id.into();
        let replica = replica.into();

        if let Some(tombstone) = self.tombstones.get(&id) {
            if tombstone.timestamp >= timestamp {
                return false;
            }
        }
        if let Some(existing) = self.entries.get(&id) {
            if existing.stamp() >= (timestamp, replica.as_str()) {
                return false;
            }
        }

        // The new entry strictly dominates any remaining tombstone.
        self.tombstones.remove(&id);
        self.entries.insert(
            id,
            Entry {
                value,
                timestamp,
                replica,
            },
        );
        true
    }

    /// Remove `id`, stamped `(timestamp, replica)`.
    ///
    /// Skipped (returns `false`) if a strictly newer entry exists.
    /// Otherwise the entry (if any) is dropped and a tombstone recorded;
    /// the tombstone is kept even when the id was never seen here, so the
    /// removal still takes effect after a merge.
    pub fn remove(
        &mut self,
        id: impl Into<String>,
        timestamp: i64,
        replica: impl Into<String>,
    ) -> bool {
        let id = id.into();
        let replica = replica.into();

        if let Some(entry) = self.entries.get(&id) {
            if entry.timestamp > timestamp {
                return false;
            }
        }

        let removed = self.entries.remove(&id).is_some();

        let candidate = Tombstone { timestamp, replica };
        match self.tombstones.get_mut(&id) {
            Some(existing) if existing.stamp() >= candidate.stamp() => {}
            Some(existing) => *existing = candidate,
            None => {
                self.tombstones.insert(id, candidate);
            }
        }
        removed
    }

    /// Whether `id` is visible: an entry exists and no tombstone is at
    /// least as recent.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// The visible value under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        let entry = self.entries.get(id)?;
        match self.tombstones.get(id) {
            Some(tombstone) if tombstone.timestamp >= entry.timestamp => None,
            _ => Some(&entry.value),
        }
    }

    /// Number of visible elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.keys().filter(|id| self.contains(id)).count()
    }

    /// Whether no element is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visible values in ascending `(timestamp, replica)` order.
    #[must_use]
    pub fn values(&self) -> Vec<&T> {
        let mut visible: Vec<&Entry<T>> = self
            .entries
            .iter()
            .filter(|(id, _)| self.contains(id))
            .map(|(_, entry)| entry)
            .collect();
        visible.sort_by(|a, b| a.stamp().cmp(&b.stamp()));
        visible.into_iter().map(|entry| &entry.value).collect()
    }

    /// Visible ids in ascending `(timestamp, replica)` order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut visible: Vec<(&str, &Entry<T>)> = self
            .entries
            .iter()
            .filter(|(id, _)| self.contains(id))
            .map(|(id, entry)| (id.as_str(), entry))
            .collect();
        visible.sort_by(|a, b| a.1.stamp().cmp(&b.1.stamp()));
        visible.into_iter().map(|(id, _)| id).collect()
    }
}

impl<T: Clone> Crdt for TombstoneSet<T> {
    fn merge(&mut self, other: &Self) {
        // 1. Entries: keep the larger (timestamp, replica) stamp per id.
        for (id, entry) in &other.entries {
            match self.entries.get_mut(id) {
                Some(existing) if existing.stamp() >= entry.stamp() => {}
                Some(existing) => *existing = entry.clone(),
                None => {
                    self.entries.insert(id.clone(), entry.clone());
                }
            }
        }

        // 2. Tombstones: same rule.
        for (id, tombstone) in &other.tombstones {
            match self.tombstones.get_mut(id) {
                Some(existing) if existing.stamp() >= tombstone.stamp() => {}
                Some(existing) => *existing = tombstone.clone(),
                None => {
                    self.tombstones.insert(id.clone(), tombstone.clone());
                }
            }
        }

        // 3. Drop entries strictly dominated by their tombstone.
        let tombstones = &self.tombstones;
        self.entries.retain(|id, entry| match tombstones.get(id) {
            Some(tombstone) => tombstone.timestamp <= entry.timestamp,
            None => true,
        });

        // 4. Drop tombstones strictly dominated by their entry.
        let entries = &self.entries;
        self.tombstones.retain(|id, tombstone| match entries.get(id) {
            Some(entry) => entry.timestamp <= tombstone.timestamp,
            None => true,
        });
    }
}
