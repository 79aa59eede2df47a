use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::Crdt;

/// A dense position in an [`Rga`] sequence, rendered as a dotted-decimal
/// string (`"0.1"`, `"0.1.5"`, `"0.2"`, ...).
///
/// Positions order component-wise numerically, so `"0.10" > "0.9"` and a
/// proper prefix sorts before its extensions. Between any two occupied
/// positions a new one can (almost) always be generated; where the scheme
/// has no room, the generated position duplicates a neighbor and the
/// sequence falls back to the `(timestamp, replica, id)` sort key, which
/// keeps every replica ordering the same way.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(Vec<u64>);

impl Position {
    /// The position assigned to the first element of an empty sequence.
    #[must_use]
    pub fn first() -> Self {
        Position(alloc::vec![0, 0])
    }

    /// A position strictly after `self`: increment the last component.
    #[must_use]
    pub fn after(&self) -> Self {
        let mut components = self.0.clone();
        match components.last_mut() {
            Some(last) => *last += 1,
            None => components.push(1),
        }
        Position(components)
    }

    /// A position before `self`: decrement the last nonzero component and
    /// truncate what follows. An all-zero position is shortened instead;
    /// `"0"` has no predecessor and is reused.
    #[must_use]
    pub fn before(&self) -> Self {
        if let Some(i) = self.0.iter().rposition(|&c| c > 0) {
            let mut components = self.0[..=i].to_vec();
            components[i] -= 1;
            Position(components)
        } else if self.0.len() > 1 {
            Position(self.0[..self.0.len() - 1].to_vec())
        } else {
            self.clone()
        }
    }

    /// A position strictly between `lower` and `upper` where the scheme
    /// admits one: floor-midpoint at the first component with a gap,
    /// otherwise an extension of the lower bound. Returns `upper` itself
    /// when no strictly-between position exists.
    #[must_use]
    pub fn between(lower: &Position, upper: &Position) -> Self {
        let mut out: Vec<u64> = Vec::new();
        let mut i = 0;
        loop {
            match (lower.0.get(i).copied(), upper.0.get(i).copied()) {
                (Some(a), Some(b)) if a == b => {
                    out.push(a);
                    i += 1;
                }
                (Some(a), Some(b)) if a < b => {
                    if b - a > 1 {
                        out.push(a + (b - a) / 2);
                    } else {
                        // Adjacent components: extend the lower bound.
                        out.extend_from_slice(&lower.0[i..]);
                        out.push(1);
                    }
                    return Position(out);
                }
                (None, Some(b)) => {
                    if b > 1 {
                        out.push(b / 2);
                        return Position(out);
                    }
                    if b == 1 {
                        out.push(0);
                        out.push(1);
                        return Position(out);
                    }
                    // Trailing zero on the upper bound: descend into it.
                    out.push(0);
                    i += 1;
                }
                _ => return upper.clone(),
            }
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

/// Error parsing a dotted-decimal position string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePositionError;

impl fmt::Display for ParsePositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid dotted-decimal position")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParsePositionError {}

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParsePositionError);
        }
        s.split('.')
            .map(|part| part.parse::<u64>().map_err(|_| ParsePositionError))
            .collect::<Result<Vec<u64>, _>>()
            .map(Position)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Position {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Position {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <alloc::borrow::Cow<'de, str> as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error returned when a sequence index is out of range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexError {
    /// The offending index.
    pub index: usize,
    /// The sequence length at the time of the call.
    pub len: usize,
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index {} out of bounds for length {}", self.index, self.len)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for IndexError {}

/// A replicated growable array (RGA) — an ordered sequence CRDT.
///
/// Each element gets a unique id and a dense [`Position`]; the visible
/// sequence is the elements sorted by position (ties broken by
/// `(timestamp, replica, id)`). Inserting between two elements generates a
/// position strictly between theirs, so concurrent edits at different
/// spots never conflict, and concurrent inserts at the same spot resolve
/// deterministically on every replica.
///
/// # Example
///
/// ```
/// use replikit::prelude::*;
///
/// let mut list = Rga::new();
/// list.append('a', 100, "r1");
/// list.append('c', 101, "r1");
/// list.insert_at(1, 'b', 102, "r1").unwrap();
///
/// assert_eq!(list.to_vec(), ['a', 'b', 'c']);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rga<T: Clone> {
    entries: BTreeMap<String, RgaEntry<T>>,
    counter: u64,
    /// Cached visible order of entry ids. Recomputed on mutation.
    sequence: Vec<String>,
}

// Hand-written so `T` needs no `Default` bound.
impl<T: Clone> Default for Rga<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct RgaEntry<T> {
    value: T,
    timestamp: i64,
    replica: String,
    position: Position,
}

impl<T: Clone> Rga<T> {
    /// Create an empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            counter: 0,
            sequence: Vec::new(),
        }
    }

    /// Append a value, stamped `(timestamp, replica)`.
    ///
    /// The generated position is strictly greater than the current maximum.
    pub fn append(&mut self, value: T, timestamp: i64, replica: &str) {
        let position = match self.sequence.last() {
            Some(id) => self.entries[id].position.after(),
            None => Position::first(),
        };
        self.insert_entry(value, timestamp, replica, position);
    }

    /// Insert a value at `index` in the visible sequence.
    ///
    /// The generated position lies strictly between the neighbors wherever
    /// the position scheme has room. Fails with [`IndexError`] when
    /// `index > len`.
    pub fn insert_at(
        &mut self,
        index: usize,
        value: T,
        timestamp: i64,
        replica: &str,
    ) -> Result<(), IndexError> {
        let len = self.sequence.len();
        if index > len {
            return Err(IndexError { index, len });
        }

        let lower = index
            .checked_sub(1)
            .map(|i| &self.entries[&self.sequence[i]].position);
        let upper = self
            .sequence
            .get(index)
            .map(|id| &self.entries[id].position);

        let position = match (lower, upper) {
            (Some(p), Some(q)) => Position::between(p, q),
            (None, Some(q)) => q.before(),
            (Some(p), None) => p.after(),
            (None, None) => Position::first(),
        };

        self.insert_entry(value, timestamp, replica, position);
        Ok(())
    }

    /// Remove the element at `index` in the visible sequence.
    ///
    /// Returns the removed value, or `None` if out of bounds.
    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        let id = self.sequence.get(index)?.clone();
        let entry = self.entries.remove(&id)?;
        self.rebuild_sequence();
        Some(entry.value)
    }

    /// The element at `index` in the visible sequence.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        let id = self.sequence.get(index)?;
        self.entries.get(id).map(|entry| &entry.value)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Iterate over elements in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.sequence
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| &entry.value)
    }

    /// Collect the sequence into a `Vec`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// The position string of the element at `index`, mainly for
    /// diagnostics.
    #[must_use]
    pub fn position_at(&self, index: usize) -> Option<&Position> {
        let id = self.sequence.get(index)?;
        self.entries.get(id).map(|entry| &entry.position)
    }

    fn insert_entry(&mut self, value: T, timestamp: i64, replica: &str, position: Position) {
        self.counter += 1;
        let id = format!("{replica}:{}", self.counter);
        self.entries.insert(
            id,
            RgaEntry {
                value,
                timestamp,
                replica: String::from(replica),
                position,
            },
        );
        self.rebuild_sequence();
    }

    /// Recompute the visible order: positions first, then `(timestamp,
    /// replica, id)` so colliding positions still order identically on
    /// every replica.
    fn rebuild_sequence(&mut self) {
        let mut order: Vec<(&Position, i64, &str, &String)> = self
            .entries
            .iter()
            .map(|(id, entry)| (&entry.position, entry.timestamp, entry.replica.as_str(), id))
            .collect();
        order.sort();
        self.sequence = order.into_iter().map(|(_, _, _, id)| id.clone()).collect();
    }
}

impl<T: Clone> Crdt for Rga<T> {
    fn merge(&mut self, other: &Self) {
        for (id, entry) in &other.entries {
            match self.entries.get_mut(id) {
                Some(existing)
                    if (existing.timestamp, existing.replica.as_str())
                        >= (entry.timestamp, entry.replica.as_str()) => {}
                Some(existing) => *existing = entry.clone(),
                None => {
                    self.entries.insert(id.clone(), entry.clone());
                }
            }
        }
        self.counter = self.counter.max(other.counter);
        self.rebuild_sequence();
    }
}
