use crate::{Crdt, GCounter};

/// A positive-negative counter (PN-Counter).
///
/// Two internal [`GCounter`]s track increments and decrements separately;
/// the value is their difference. Merge joins both components with the
/// per-replica maximum, so the counter is monotone in each component even
/// though its value can move in both directions.
///
/// # Example
///
/// ```
/// use replikit::prelude::*;
///
/// let mut c1 = PNCounter::new();
/// c1.increment("r1", 5);
/// c1.decrement("r1", 2);
///
/// let mut c2 = PNCounter::new();
/// c2.increment("r2", 3);
/// c2.decrement("r2", 1);
///
/// c1.merge(&c2);
/// assert_eq!(c1.value(), 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PNCounter {
    increments: GCounter,
    decrements: GCounter,
}

impl PNCounter {
    /// Create a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            increments: GCounter::new(),
            decrements: GCounter::new(),
        }
    }

    /// Add `amount` on behalf of `replica`.
    pub fn increment(&mut self, replica: &str, amount: u64) {
        self.increments.increment(replica, amount);
    }

    /// Subtract `amount` on behalf of `replica`.
    pub fn decrement(&mut self, replica: &str, amount: u64) {
        self.decrements.increment(replica, amount);
    }

    /// Current value: total increments minus total decrements.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.increments.value() as i64 - self.decrements.value() as i64
    }
}

impl Crdt for PNCounter {
    fn merge(&mut self, other: &Self) {
        self.increments.merge(&other.increments);
        self.decrements.merge(&other.decrements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_counter_is_zero() {
        assert_eq!(PNCounter::new().value(), 0);
    }

    #[test]
    fn increment_and_decrement() {
        let mut c = PNCounter::new();
        c.increment("a", 2);
        c.decrement("a", 1);
        assert_eq!(c.value(), 1);
    }

    #[test]
    fn can_go_negative() {
        let mut c = PNCounter::new();
        c.decrement("a", 2);
        assert_eq!(c.value(), -2);
    }

    #[test]
    fn merge_sums_across_replicas() {
        let mut c1 = PNCounter::new();
        c1.increment("r1", 5);
        c1.decrement("r1", 2);

        let mut c2 = PNCounter::new();
        c2.increment("r2", 3);
        c2.decrement("r2", 1);

        c1.merge(&c2);
        assert_eq!(c1.value(), 5); // (5 - 2) + (3 - 1)
    }

    #[test]
    fn merge_is_commutative() {
        let mut c1 = PNCounter::new();
        c1.increment("a", 1);

        let mut c2 = PNCounter::new();
        c2.decrement("b", 2);

        let mut left = c1.clone();
        left.merge(&c2);

        let mut right = c2.clone();
        right.merge(&c1);

        assert_eq!(left, right);
    }

    #[test]
    fn merge_is_associative() {
        let mut a = PNCounter::new();
        a.increment("a", 1);
        let mut b = PNCounter::new();
        b.increment("b", 2);
        let mut c = PNCounter::new();
        c.decrement("c", 3);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);

        let mut bc = b.clone();
        bc.merge(&c);
        let mut right = a.clone();
        right.merge(&bc);

        assert_eq!(left, right);
        assert_eq!(left.value(), 0);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut c1 = PNCounter::new();
        c1.increment("a", 1);

        let mut c2 = PNCounter::new();
        c2.decrement("b", 1);

        c1.merge(&c2);
        let after_first = c1.clone();
        c1.merge(&c2);

        assert_eq!(c1, after_first);
    }
}
