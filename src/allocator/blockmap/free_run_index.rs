use std::collections::BTreeMap;
use std::collections::btree_map;

/// The ordered half of the dual index: every free run, keyed by its
/// `low` block number, mapping to its arena slot.
///
/// A `BTreeMap` gives the "sequential traversal from a starting
/// descriptor" spec §4.1 asks for via `range`, and gives up the
/// teacher's own intrusive linked list in exchange for not having to
/// hand-roll merge/split pointer surgery -- spec §9 explicitly allows
/// substituting "a balanced tree keyed on `low`" for this index with no
/// observable change.
#[derive(Debug, Default)]
pub struct FreeRunIndex {
    by_low: BTreeMap<u64, usize>,
}

impl FreeRunIndex {
    pub fn new() -> Self {
        Self {
            by_low: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_low.is_empty()
    }

    pub fn insert(&mut self, low: u64, key: usize) {
        let prior = self.by_low.insert(low, key);
        debug_assert!(prior.is_none(), "two free runs with the same low block");
    }

    /// Remove the entry for `low`. Used when a descriptor's low moves
    /// (re-key) or when it is absorbed by a merge / fully allocated.
    pub fn remove(&mut self, low: u64) -> Option<usize> {
        self.by_low.remove(&low)
    }

    /// Move the entry for `old_low` to `new_low`, keeping the same
    /// arena key. Used whenever a descriptor's `low` is mutated in
    /// place rather than replaced.
    pub fn rekey(&mut self, old_low: u64, new_low: u64) {
        if old_low == new_low {
            return;
        }
        let key = self
            .by_low
            .remove(&old_low)
            .expect("rekey source must be present");
        self.insert(new_low, key);
    }

    /// Iterate ascending-by-`low`, optionally starting at or after
    /// `start_hint`. The hint is purely a starting point for the scan;
    /// starting from the very first entry is always correct too.
    pub fn from_hint(&self, start_hint: Option<u64>) -> btree_map::Range<'_, u64, usize> {
        match start_hint {
            Some(low) => self.by_low.range(low..),
            None => self.by_low.range(..),
        }
    }

    pub fn first(&self) -> Option<(u64, usize)> {
        self.by_low.iter().next().map(|(&low, &key)| (low, key))
    }

    pub fn last(&self) -> Option<(u64, usize)> {
        self.by_low.iter().next_back().map(|(&low, &key)| (low, key))
    }

    /// The entry with the greatest `low` strictly less than `low`.
    pub fn prev_of(&self, low: u64) -> Option<(u64, usize)> {
        self.by_low
            .range(..low)
            .next_back()
            .map(|(&low, &key)| (low, key))
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.by_low.len()
    }

    #[cfg(test)]
    pub(crate) fn lows(&self) -> Vec<u64> {
        self.by_low.keys().copied().collect()
    }
}
