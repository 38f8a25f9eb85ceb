//! A free-space block allocator for a persistent-memory file system.
//!
//! # Internal design
//! ## Dual index
//! Free blocks are tracked twice: once in a [`free_run_index`], ordered
//! by block number so [`BlockMap::free`] can coalesce a newly freed
//! range with its neighbours, and once in a [`size_class_index`],
//! grouped by length so [`BlockMap::allocate`] can be served without
//! scanning. Both indices hold keys into a shared [`slab::Slab`] of
//! [`descriptor::RunDescriptor`]s rather than owning pointers, so
//! reclassifying a run between buckets is an O(1) arena operation.
//!
//! ## Locking
//! A single [`parking_lot::Mutex`] per `BlockMap` instance stands in for
//! the external per-superblock mutual-exclusion primitive this design
//! was built for. Every public method holds it for its full body and
//! releases it on every exit path, error paths included.
//!
//! # References
//! * Adapted from the `pmfs_new_block` / `__pmfs_free_block` free-space
//!   bookkeeping of the PMFS persistent-memory file system.

mod descriptor;
mod device;
mod error;
mod free_run_index;
mod size_class;
mod size_class_index;
mod state;

pub use descriptor::RunDescriptor;
pub use device::{NullDevice, PmemDevice};
pub use error::BlockMapError;
pub use size_class::{SizeClass, BLOCK_SIZE};

use state::State;

/// The allocator for one mounted file system's free-space map.
///
/// # Note
/// Each mounted file system owns its own `BlockMap` instance; there is
/// no process-wide global state (spec's "Global state" design note). A
/// `BlockMap` is safe to share across threads -- every operation
/// acquires the internal lock on entry.
#[derive(Debug)]
pub struct BlockMap {
    state: parking_lot::Mutex<State>,
}

impl BlockMap {
    /// Initializes the free-space map for a device spanning
    /// `[block_start, block_end]` inclusive, with `reserved_prefix_bytes`
    /// bytes at the start of the range permanently reserved for the
    /// superblock and journal.
    ///
    /// Constructs a single Run Descriptor covering the remainder of the
    /// device and files it under both indices.
    pub fn init_blockmap(block_start: u64, block_end: u64, reserved_prefix_bytes: u64) -> Self {
        let reserved_prefix_blocks =
            (reserved_prefix_bytes + size_class::BLOCK_SIZE - 1) / size_class::BLOCK_SIZE;

        Self {
            state: parking_lot::Mutex::new(State::new(
                block_start,
                block_end,
                reserved_prefix_blocks,
            )),
        }
    }

    /// Reserves a contiguous run of `size_class.numblocks()` blocks and
    /// returns the block number of the first one.
    ///
    /// Tries `size_class`'s own bucket first, then cascades to the next
    /// larger class (4K -> 2M -> 1G) until a non-empty bucket is found.
    /// Returns [`BlockMapError::OutOfSpace`] if every class at or above
    /// `size_class` is empty; the allocator's state is unchanged in
    /// that case.
    ///
    /// When `zero_fill` is set, the returned range is zeroed through
    /// `device` with non-temporal stores before the lock is released,
    /// so no other thread can observe the range as allocated-but-dirty.
    pub fn allocate(
        &self,
        size_class: SizeClass,
        zero_fill: bool,
        device: &impl PmemDevice,
    ) -> Result<u64, BlockMapError> {
        let mut state = self.state.lock();
        let first_block = state.allocate(size_class)?;

        if zero_fill {
            self.zero_range(device, first_block, size_class.numblocks());
        }

        Ok(first_block)
    }

    /// Returns a previously allocated run of `size_class.numblocks()`
    /// blocks starting at `first_block` to the free pool, coalescing
    /// with adjacent free runs where possible.
    ///
    /// `start_hint` is an optional cached Free-Run Index position (the
    /// `low` of some descriptor) to resume the search from; it is purely
    /// an optimization and may be stale, absent, or simply wrong without
    /// affecting correctness.
    ///
    /// Fails with [`BlockMapError::DoubleFreeOrCorruption`] if the range
    /// cannot be placed consistently with the index's invariants
    /// (overlap with an existing free run, or a range outside the
    /// allocatable device range). State is left unchanged on failure.
    pub fn free(
        &self,
        first_block: u64,
        size_class: SizeClass,
        start_hint: Option<u64>,
    ) -> Result<(), BlockMapError> {
        let mut state = self.state.lock();
        state.free(first_block, size_class, start_hint)
    }

    /// A snapshot of the number of blocks currently free.
    pub fn free_block_count(&self) -> u64 {
        self.state.lock().free_block_count()
    }

    /// Number of live Run Descriptors, for diagnostics and tests.
    pub fn descriptor_count(&self) -> usize {
        self.state.lock().descriptor_count()
    }

    fn zero_range(&self, device: &impl PmemDevice, first_block: u64, num_blocks: u64) {
        let len = (num_blocks * size_class::BLOCK_SIZE) as usize;
        match device.block_address(first_block) {
            Some(ptr) => unsafe {
                device.memunlock(ptr, len);
                device.zero_nontemporal(ptr, len);
                device.memlock(ptr, len);
            },
            None => {
                log::trace!(
                    "zero_fill requested for block {} but device has no backing address",
                    first_block
                );
            }
        }
    }
}
