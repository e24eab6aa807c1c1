// CRDT primitives for the balance ledger
//
// G-Set (grow-only set) for settlement histories and G-Counter (per-node
// monotonic counters) for balance deltas. Both merge without coordination:
// the operations are commutative, associative, and idempotent, which is
// what lets divergent partition timelines reconcile deterministically.

use crate::settlement::record::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

/// Result of a merge operation
#[derive(Clone, Debug)]
pub struct MergeResult {
    /// Number of new entries added during merge
    pub new_entries: usize,
    /// Total entries after merge
    pub total_after_merge: usize,
}

/// G-Set (Grow-only Set) - elements can only be added, never removed
///
/// Properties:
/// - Commutative: merge(A, B) == merge(B, A)
/// - Associative: merge(merge(A, B), C) == merge(A, merge(B, C))
/// - Idempotent: merge(A, A) == A
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GSet<T>
where
    T: Eq + Hash + Clone,
{
    elements: HashSet<T>,
}

impl<T> Default for GSet<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GSet<T>
where
    T: Eq + Hash + Clone,
{
    /// Create a new empty G-Set
    pub fn new() -> Self {
        Self {
            elements: HashSet::new(),
        }
    }

    /// Insert an element; returns true if it was new
    pub fn insert(&mut self, element: T) -> bool {
        self.elements.insert(element)
    }

    /// Check if the set contains an element
    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Iterate over all elements
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }

    /// Merge another G-Set into this one (union)
    pub fn merge(&mut self, other: &GSet<T>) {
        for element in &other.elements {
            self.elements.insert(element.clone());
        }
    }

    /// Merge with result tracking
    pub fn merge_with_result(&mut self, other: &GSet<T>) -> MergeResult {
        let before = self.elements.len();
        self.merge(other);
        let after = self.elements.len();

        MergeResult {
            new_entries: after - before,
            total_after_merge: after,
        }
    }
}

/// G-Counter - a map of node identity to monotonic counter.
///
/// Each key is owned by exactly one writer: a node only ever increments
/// its own entry, so any two replicas' values for a key are comparable and
/// per-key maximum converges to the writer's latest count. Used for the
/// per-account `delta_earned` / `delta_spent` maps, where the single-writer
/// rule holds because a node's settlement activity is recorded under its
/// own identity and a node lives in exactly one partition at a time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    counts: BTreeMap<NodeId, u64>,
}

impl GCounter {
    /// Create a new empty counter
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Check if no key has been incremented
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of contributing keys
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Increment the counter owned by `owner`
    pub fn increment(&mut self, owner: &NodeId, amount: u64) {
        let entry = self.counts.entry(owner.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Get the count for a specific key
    pub fn get(&self, owner: &NodeId) -> u64 {
        self.counts.get(owner).copied().unwrap_or(0)
    }

    /// Sum across all keys
    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Iterate over (key, count) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    /// Merge another counter into this one (per-key maximum)
    pub fn merge(&mut self, other: &GCounter) {
        for (key, value) in &other.counts {
            let entry = self.counts.entry(key.clone()).or_insert(0);
            if *value > *entry {
                *entry = *value;
            }
        }
    }

    /// Reset all keys to empty (only valid at a rebase boundary)
    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    #[test]
    fn test_gset_basic_operations() {
        let mut gset: GSet<i32> = GSet::new();
        assert!(gset.is_empty());

        gset.insert(1);
        assert_eq!(gset.len(), 1);
        assert!(gset.contains(&1));
        assert!(!gset.contains(&2));
    }

    #[test]
    fn test_gset_merge() {
        let mut gset1: GSet<i32> = GSet::new();
        gset1.insert(1);
        gset1.insert(2);

        let mut gset2: GSet<i32> = GSet::new();
        gset2.insert(2);
        gset2.insert(3);

        let result = gset1.merge_with_result(&gset2);
        assert_eq!(result.new_entries, 1);
        assert_eq!(gset1.len(), 3);
    }

    #[test]
    fn test_gcounter_increment_and_total() {
        let mut counter = GCounter::new();
        counter.increment(&node(1), 10);
        counter.increment(&node(1), 5);
        counter.increment(&node(2), 7);

        assert_eq!(counter.get(&node(1)), 15);
        assert_eq!(counter.get(&node(2)), 7);
        assert_eq!(counter.total(), 22);
    }

    #[test]
    fn test_gcounter_merge_takes_per_key_max() {
        let mut c1 = GCounter::new();
        c1.increment(&node(1), 10);
        c1.increment(&node(2), 3);

        let mut c2 = GCounter::new();
        c2.increment(&node(1), 4);
        c2.increment(&node(3), 8);

        c1.merge(&c2);

        assert_eq!(c1.get(&node(1)), 10); // max(10, 4)
        assert_eq!(c1.get(&node(2)), 3);
        assert_eq!(c1.get(&node(3)), 8);
        assert_eq!(c1.total(), 21);
    }

    #[test]
    fn test_gcounter_merge_is_commutative() {
        let mut c1 = GCounter::new();
        c1.increment(&node(1), 10);

        let mut c2 = GCounter::new();
        c2.increment(&node(2), 20);

        let mut ab = c1.clone();
        ab.merge(&c2);
        let mut ba = c2.clone();
        ba.merge(&c1);

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_gcounter_merge_is_idempotent() {
        let mut c1 = GCounter::new();
        c1.increment(&node(1), 10);
        c1.increment(&node(2), 20);

        let snapshot = c1.clone();
        c1.merge(&snapshot);
        c1.merge(&snapshot);

        assert_eq!(c1, snapshot);
    }

    #[test]
    fn test_gcounter_merge_is_associative() {
        let mut c1 = GCounter::new();
        c1.increment(&node(1), 1);
        let mut c2 = GCounter::new();
        c2.increment(&node(2), 2);
        let mut c3 = GCounter::new();
        c3.increment(&node(3), 3);

        let mut left = c1.clone();
        left.merge(&c2);
        left.merge(&c3);

        let mut right23 = c2.clone();
        right23.merge(&c3);
        let mut right = c1.clone();
        right.merge(&right23);

        assert_eq!(left, right);
    }
}
