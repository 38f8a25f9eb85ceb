use super::size_class::SizeClass;

/// Errors the allocator can surface, per spec §7.
///
/// `ResourceExhaustion` is not a variant here: spec §7 marks it fatal and
/// says implementations must assert rather than propagate it, which is
/// what [`super::BlockMap`] does when the arena cannot grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockMapError {
    /// No bucket at the requested class, or any larger class, held a
    /// free run. Returned from `allocate`; the allocator's state is
    /// unchanged.
    #[error("no free run available for size class {0:?}")]
    OutOfSpace(SizeClass),

    /// `free` could not locate a position for `[first_block, first_block
    /// + numblocks - 1]` consistent with the Free-Run Index's
    /// invariants: the range overlaps an existing free run, starts
    /// before the reserved prefix, or runs past `block_end`.
    ///
    /// Indicates caller error (double free, or corruption of the
    /// allocator's bookkeeping); the allocator's state is left
    /// unchanged.
    #[error("free({first_block}, {size_class:?}) is inconsistent with the free-run index: double free or corruption")]
    DoubleFreeOrCorruption {
        /// The block number the caller attempted to free.
        first_block: u64,
        /// The size class the caller attempted to free it under.
        size_class: SizeClass,
    },
}
