use slab::Slab;

use super::descriptor::RunDescriptor;
use super::error::BlockMapError;
use super::free_run_index::FreeRunIndex;
use super::size_class::SizeClass;
use super::size_class_index::SizeClassIndex;

/// Everything the superblock lock guards: the dual index, the arena the
/// two halves of it share keys into, and the block-range bookkeeping
/// from spec §3's "Allocator State" row.
#[derive(Debug)]
pub(super) struct State {
    arena: Slab<RunDescriptor>,
    free_index: FreeRunIndex,
    size_classes: SizeClassIndex,
    block_start: u64,
    block_end: u64,
    reserved_prefix_blocks: u64,
    free_block_count: u64,
}

/// Where a freed range `[new_low, new_high]` lands relative to the
/// existing Free-Run Index, per the six cases of spec §4.2. Carries
/// just enough to re-find the descriptors involved during `apply`;
/// `new_low`/`new_high` themselves are threaded through separately since
/// every case needs them.
enum Placement {
    /// Case 1a: `i` is the last descriptor and the new range extends it
    /// to the right with no gap.
    ExtendTailRight { i_key: usize },
    /// Case 1b: `i` is the last descriptor and the new range starts
    /// strictly after it, with a gap remaining.
    AppendAfterTail,
    /// Case 3: the new range exactly fills the gap between `prev` and
    /// `i`. `prev_key` is `None` when the gap abuts the reserved prefix.
    FillGap { prev_key: Option<usize>, i_key: usize },
    /// Case 4: the new range abuts `prev` on its right but leaves a gap
    /// before `i`. `prev_key` is `None` when there is no predecessor at
    /// all (the gap abuts the reserved prefix).
    AlignLeft { prev_key: Option<usize> },
    /// Case 5: the new range abuts `i` on its left but leaves a gap
    /// after `prev`.
    AlignRight { i_key: usize },
    /// Case 6: the new range touches neither neighbour.
    AlignMiddle,
}

impl State {
    pub(super) fn new(block_start: u64, block_end: u64, reserved_prefix_blocks: u64) -> Self {
        let mut arena = Slab::new();
        let mut free_index = FreeRunIndex::new();
        let mut size_classes = SizeClassIndex::new();

        let low = block_start + reserved_prefix_blocks;
        let high = block_end;
        let key = arena.insert(RunDescriptor::new(low, high, 0));
        free_index.insert(low, key);
        let class = SizeClass::classify(high - low + 1);
        size_classes.insert(&mut arena, class, key);

        Self {
            arena,
            free_index,
            size_classes,
            block_start,
            block_end,
            reserved_prefix_blocks,
            free_block_count: high - low + 1,
        }
    }

    pub(super) fn free_block_count(&self) -> u64 {
        self.free_block_count
    }

    pub(super) fn descriptor_count(&self) -> usize {
        self.arena.len()
    }

    /// spec §4.3.
    pub(super) fn allocate(&mut self, size_class: SizeClass) -> Result<u64, BlockMapError> {
        let num_blocks = size_class.numblocks();

        let chosen = self
            .size_classes
            .first_nonempty_from(size_class)
            .ok_or(BlockMapError::OutOfSpace(size_class))?;

        let key = self
            .size_classes
            .pop_any(&mut self.arena, chosen)
            .expect("first_nonempty_from guarantees this bucket has a member");

        let desc = self.arena[key];
        let first_block = desc.low;
        debug_assert!(
            desc.length() >= num_blocks,
            "bucket invariant: every member's length is at least its class's numblocks"
        );

        if desc.length() == num_blocks {
            self.free_index.remove(desc.low);
            self.arena.remove(key);
        } else {
            let new_low = first_block + num_blocks;
            self.free_index.rekey(desc.low, new_low);
            self.arena[key].low = new_low;
            let new_class = SizeClass::classify(self.arena[key].length());
            self.size_classes.insert(&mut self.arena, new_class, key);
        }

        self.free_block_count -= num_blocks;
        log::trace!(
            "allocate({:?}) -> block {} ({} blocks, bucket {:?})",
            size_class,
            first_block,
            num_blocks,
            chosen
        );
        Ok(first_block)
    }

    /// spec §4.2.
    pub(super) fn free(
        &mut self,
        first_block: u64,
        size_class: SizeClass,
        start_hint: Option<u64>,
    ) -> Result<(), BlockMapError> {
        let num_blocks = size_class.numblocks();
        let new_low = first_block;
        let new_high = first_block + num_blocks - 1;

        debug_assert!(
            !self.free_index.is_empty(),
            "freeing into a fully-allocated filesystem is impossible by construction"
        );

        let corrupt = || BlockMapError::DoubleFreeOrCorruption {
            first_block,
            size_class,
        };

        if new_high > self.block_end
            || new_low < self.block_start + self.reserved_prefix_blocks
        {
            log::error!(
                "free({}, {:?}) falls outside the device's allocatable range",
                first_block,
                size_class
            );
            return Err(corrupt());
        }

        let placement = self.locate(new_low, new_high, start_hint).ok_or_else(|| {
            log::error!(
                "free({}, {:?}) overlaps an existing free run or the reserved prefix",
                first_block,
                size_class
            );
            corrupt()
        })?;

        self.apply(placement, new_low, new_high, num_blocks);
        self.free_block_count += num_blocks;
        log::debug!(
            "free({}, {:?}) accepted ({} blocks)",
            first_block,
            size_class,
            num_blocks
        );
        Ok(())
    }

    /// Find where `[new_low, new_high]` belongs among the existing free
    /// runs. Returns `None` when the range is inconsistent with the
    /// index (overlap or out-of-range), which the caller turns into
    /// `DoubleFreeOrCorruption`.
    fn locate(&self, new_low: u64, new_high: u64, start_hint: Option<u64>) -> Option<Placement> {
        let mut last_seen: Option<(u64, usize)> = None;

        for (low, key) in self.free_index.from_hint(start_hint) {
            last_seen = Some((low, key));
            let i_high = self.arena[key].high;

            if new_low > i_high {
                // Strictly after this descriptor; keep scanning.
                continue;
            }

            if new_high >= low {
                // Overlaps i itself.
                return None;
            }

            let prev = self.free_index.prev_of(low);
            // i128 avoids wrap-around when there is no real predecessor
            // and no reserved prefix (block_start == 0, reserved_prefix_blocks == 0).
            let prev_high: i128 = match prev {
                Some((_, prev_key)) => self.arena[prev_key].high as i128,
                None => self.block_start as i128 + self.reserved_prefix_blocks as i128 - 1,
            };

            if new_low as i128 <= prev_high {
                // Overlaps the predecessor (or the reserved prefix).
                return None;
            }

            let prev_key = prev.map(|(_, key)| key);
            return Some(match (new_low as i128 == prev_high + 1, new_high == low - 1) {
                (true, true) => Placement::FillGap { prev_key, i_key: key },
                (true, false) => Placement::AlignLeft { prev_key },
                (false, true) => Placement::AlignRight { i_key: key },
                (false, false) => Placement::AlignMiddle,
            });
        }

        let (_, last_key) = last_seen.or_else(|| self.free_index.last())?;
        let last_high = self.arena[last_key].high;

        if new_low == last_high + 1 {
            Some(Placement::ExtendTailRight { i_key: last_key })
        } else if new_low > last_high + 1 {
            Some(Placement::AppendAfterTail)
        } else {
            None
        }
    }

    fn apply(&mut self, placement: Placement, new_low: u64, new_high: u64, num_blocks: u64) {
        match placement {
            Placement::ExtendTailRight { i_key } => {
                self.reclassify_after(i_key, |d| d.high = new_high);
            }
            Placement::AppendAfterTail => {
                self.insert_fresh(new_low, new_high, num_blocks);
            }
            Placement::FillGap { prev_key, i_key } => {
                self.fill_gap(prev_key, i_key, new_low);
            }
            Placement::AlignLeft { prev_key: Some(prev_key) } => {
                self.reclassify_after(prev_key, |d| d.high = new_high);
            }
            Placement::AlignLeft { prev_key: None } => {
                self.insert_fresh(new_low, new_high, num_blocks);
            }
            Placement::AlignRight { i_key } => {
                let old_low = self.arena[i_key].low;
                self.free_index.rekey(old_low, new_low);
                self.reclassify_after(i_key, |d| d.low = new_low);
            }
            Placement::AlignMiddle => {
                self.insert_fresh(new_low, new_high, num_blocks);
            }
        }
    }

    /// Fill the gap between `prev` (if any) and `i` exactly. When `prev`
    /// exists it is absorbed into `i`; when it does not (the gap abuts
    /// the reserved prefix) `i` simply grows left to `new_low`.
    fn fill_gap(&mut self, prev_key: Option<usize>, i_key: usize, new_low: u64) {
        let merge_low = match prev_key {
            Some(prev_key) => {
                let prev = self.arena[prev_key];
                let prev_class = SizeClass::classify(prev.length());
                self.size_classes.remove(&mut self.arena, prev_class, prev_key);
                self.free_index.remove(prev.low);
                self.arena.remove(prev_key);
                prev.low
            }
            None => new_low,
        };

        let old_low = self.arena[i_key].low;
        self.free_index.rekey(old_low, merge_low);
        self.reclassify_after(i_key, |d| d.low = merge_low);
    }

    fn insert_fresh(&mut self, low: u64, high: u64, num_blocks: u64) {
        let key = self.arena.insert(RunDescriptor::new(low, high, 0));
        self.free_index.insert(low, key);
        let class = SizeClass::classify(num_blocks);
        self.size_classes.insert(&mut self.arena, class, key);
    }

    /// Mutate descriptor `key` with `mutate`, then reclassify it if its
    /// length crossed a Size-Class boundary.
    fn reclassify_after(&mut self, key: usize, mutate: impl FnOnce(&mut RunDescriptor)) {
        let old_class = SizeClass::classify(self.arena[key].length());
        mutate(&mut self.arena[key]);
        let new_class = SizeClass::classify(self.arena[key].length());
        self.size_classes
            .reclassify(&mut self.arena, old_class, new_class, key);
    }
}
