/// The external persistent-memory write path (spec §6): translating a
/// device block number to an address, unlocking/locking the page for
/// writes, and the non-temporal zero-fill itself.
///
/// A real file system backs this with actual PM-aware mapping and
/// `memunlock`/`memlock`/non-temporal `memset`; tests and callers that
/// never request `zero_fill` can use [`NullDevice`].
pub trait PmemDevice {
    /// Translate a device block number to a writable address. Returns
    /// `None` if the device does not back this implementation with
    /// addressable memory (e.g. in tests).
    fn block_address(&self, block: u64) -> Option<*mut u8>;

    /// Remove write protection from the page(s) covering `ptr` for
    /// `len` bytes. Must be paired with [`memlock`](Self::memlock).
    ///
    /// # Safety
    /// `ptr` must be a valid, currently-locked address obtained from
    /// [`block_address`](Self::block_address) for `len` bytes.
    unsafe fn memunlock(&self, ptr: *mut u8, len: usize);

    /// Re-apply write protection removed by
    /// [`memunlock`](Self::memunlock).
    ///
    /// # Safety
    /// `ptr` must be the same address passed to the matching
    /// `memunlock` call.
    unsafe fn memlock(&self, ptr: *mut u8, len: usize);

    /// Zero `len` bytes at `ptr` using non-temporal stores, bypassing
    /// the cache (this is what makes the zero-fill safe to call while
    /// still holding the superblock lock: it must not fault or block on
    /// cache coherency across sockets).
    ///
    /// # Safety
    /// `ptr` must be unlocked (see [`memunlock`](Self::memunlock)) and
    /// valid for `len` bytes.
    unsafe fn zero_nontemporal(&self, ptr: *mut u8, len: usize);
}

/// A [`PmemDevice`] with no backing memory. `block_address` always
/// returns `None`, so `allocate(.., zero_fill: true)` against a
/// `NullDevice` is a logged no-op rather than a write -- useful for unit
/// tests that only care about index bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDevice;

impl PmemDevice for NullDevice {
    fn block_address(&self, _block: u64) -> Option<*mut u8> {
        None
    }

    unsafe fn memunlock(&self, _ptr: *mut u8, _len: usize) {}

    unsafe fn memlock(&self, _ptr: *mut u8, _len: usize) {}

    unsafe fn zero_nontemporal(&self, _ptr: *mut u8, _len: usize) {}
}
