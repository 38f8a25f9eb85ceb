use slab::Slab;

use super::descriptor::RunDescriptor;
use super::size_class::SizeClass;

/// An unordered collection of arena keys, one bucket per Size-Class.
///
/// Grounded on the teacher's `DescriptorCollection` (`allocator/lrmalloc/heap/stack.rs`),
/// a lock-free push/try_pop stack of descriptor pointers with "no
/// guarantees about the order of elements" -- the same contract spec
/// §4.1 asks for here, just without the lock-free machinery, since the
/// whole index now lives behind a single mutex.
#[derive(Debug, Default)]
pub struct SizeClassIndex {
    buckets: [Vec<usize>; 3],
}

impl SizeClassIndex {
    pub fn new() -> Self {
        Self {
            buckets: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    /// Add `key` to the bucket matching `class`, and stamp the
    /// descriptor with its new slot so it can be delisted in O(1) later.
    pub fn insert(&mut self, arena: &mut Slab<RunDescriptor>, class: SizeClass, key: usize) {
        let bucket = &mut self.buckets[class.index()];
        let slot = bucket.len();
        bucket.push(key);
        arena[key].bucket_slot = slot;
    }

    /// Remove `key` from the bucket matching `class` via `swap_remove`,
    /// fixing up the slot of whichever descriptor was moved into its
    /// place.
    pub fn remove(&mut self, arena: &mut Slab<RunDescriptor>, class: SizeClass, key: usize) {
        let bucket = &mut self.buckets[class.index()];
        let slot = arena[key].bucket_slot;
        debug_assert_eq!(bucket[slot], key, "bucket_slot out of sync with its bucket");

        bucket.swap_remove(slot);
        if let Some(&moved_key) = bucket.get(slot) {
            arena[moved_key].bucket_slot = slot;
        }
    }

    /// Move `key` from `old` to `new` because its length changed class.
    pub fn reclassify(
        &mut self,
        arena: &mut Slab<RunDescriptor>,
        old: SizeClass,
        new: SizeClass,
        key: usize,
    ) {
        if old == new {
            return;
        }
        self.remove(arena, old, key);
        self.insert(arena, new, key);
    }

    /// Pop an arbitrary member out of `class`'s bucket ("first" is an
    /// implementation choice with no observable semantics, per spec
    /// §4.3).
    pub fn pop_any(&mut self, arena: &mut Slab<RunDescriptor>, class: SizeClass) -> Option<usize> {
        let bucket = &mut self.buckets[class.index()];
        let key = bucket.pop()?;
        // The descriptor's bucket_slot is now stale, but that's fine: a
        // descriptor that has been popped is either about to be
        // destroyed or about to be re-inserted (which re-stamps it).
        let _ = arena;
        Some(key)
    }

    /// Find the first size class at or above `from` with a non-empty
    /// bucket, cascading 4K -> 2M -> 1G as spec §4.3 requires.
    pub fn first_nonempty_from(&self, from: SizeClass) -> Option<SizeClass> {
        let mut class = from;
        loop {
            if !self.buckets[class.index()].is_empty() {
                return Some(class);
            }
            class = class.next_larger()?;
        }
    }

    #[cfg(test)]
    pub(crate) fn bucket_len(&self, class: SizeClass) -> usize {
        self.buckets[class.index()].len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, class: SizeClass, key: usize) -> bool {
        self.buckets[class.index()].contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with(descs: &[RunDescriptor]) -> Slab<RunDescriptor> {
        let mut arena = Slab::new();
        for d in descs {
            arena.insert(*d);
        }
        arena
    }

    #[test]
    fn insert_and_pop_any() {
        let mut arena = arena_with(&[RunDescriptor::new(0, 0, 0)]);
        let mut index = SizeClassIndex::new();

        index.insert(&mut arena, SizeClass::FourK, 0);
        assert_eq!(1, index.bucket_len(SizeClass::FourK));

        let popped = index.pop_any(&mut arena, SizeClass::FourK);
        assert_eq!(Some(0), popped);
        assert_eq!(0, index.bucket_len(SizeClass::FourK));
    }

    #[test]
    fn pop_any_on_empty_bucket() {
        let mut arena = Slab::new();
        let mut index = SizeClassIndex::new();
        assert_eq!(None, index.pop_any(&mut arena, SizeClass::OneG));
    }

    #[test]
    fn remove_with_swap_fixes_up_moved_slot() {
        let mut arena = arena_with(&[
            RunDescriptor::new(0, 0, 0),
            RunDescriptor::new(10, 10, 0),
            RunDescriptor::new(20, 20, 0),
        ]);
        let mut index = SizeClassIndex::new();
        for key in 0..3 {
            index.insert(&mut arena, SizeClass::FourK, key);
        }

        // Remove the first entry; the last (key 2) gets swapped into its slot.
        index.remove(&mut arena, SizeClass::FourK, 0);

        assert!(!index.contains(SizeClass::FourK, 0));
        assert!(index.contains(SizeClass::FourK, 1));
        assert!(index.contains(SizeClass::FourK, 2));
        assert_eq!(2, index.bucket_len(SizeClass::FourK));

        // key 2's bucket_slot must have been updated to its new position.
        index.remove(&mut arena, SizeClass::FourK, 2);
        assert!(!index.contains(SizeClass::FourK, 2));
    }

    #[test]
    fn reclassify_moves_between_buckets() {
        let mut arena = arena_with(&[RunDescriptor::new(0, 510, 0)]);
        let mut index = SizeClassIndex::new();
        index.insert(&mut arena, SizeClass::FourK, 0);

        index.reclassify(&mut arena, SizeClass::FourK, SizeClass::TwoM, 0);

        assert_eq!(0, index.bucket_len(SizeClass::FourK));
        assert_eq!(1, index.bucket_len(SizeClass::TwoM));
    }

    #[test]
    fn first_nonempty_from_cascades_up() {
        let mut arena = arena_with(&[RunDescriptor::new(0, 1_048_575, 0)]);
        let mut index = SizeClassIndex::new();
        index.insert(&mut arena, SizeClass::OneG, 0);

        assert_eq!(
            Some(SizeClass::OneG),
            index.first_nonempty_from(SizeClass::FourK)
        );
    }

    #[test]
    fn first_nonempty_from_none_when_all_empty() {
        let index = SizeClassIndex::new();
        assert_eq!(None, index.first_nonempty_from(SizeClass::FourK));
    }
}
