//! Handle to a live syscall dispatch table
//!
//! # Safety
//!
//! The table is owned by the host and read concurrently by every thread
//! that dispatches through it. This module is the only place that touches
//! its memory: slots are read with atomic loads and written with a single
//! atomic store, and writes are only reachable inside [`DispatchTable::patch`],
//! which holds protection off for exactly the duration of the closure.

use crate::protect::{ProtectionGuard, WriteProtect};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Slot of `open` (x86_64 numbering)
pub const NR_OPEN: usize = 2;
/// Slot of `close` (x86_64 numbering)
pub const NR_CLOSE: usize = 3;

/// Base address of a dispatch table found in host memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTable {
    base: NonNull<usize>,
}

impl DispatchTable {
    /// # Safety
    ///
    /// `base` must be pointer aligned and point at a table whose slots stay
    /// mapped for as long as the handle is used.
    pub unsafe fn from_raw(base: *mut usize) -> Option<Self> {
        NonNull::new(base).map(|base| Self { base })
    }

    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    fn slot(&self, index: usize) -> &AtomicUsize {
        // SAFETY: alignment and liveness are guaranteed by `from_raw`
        unsafe { AtomicUsize::from_ptr(self.base.as_ptr().add(index)) }
    }

    pub fn read_slot(&self, index: usize) -> usize {
        self.slot(index).load(Ordering::Acquire)
    }

    /// Run `f` with write protection lifted
    ///
    /// Protection is restored when `f` returns or unwinds. Keep `f` down to
    /// the slot stores; every other thread keeps running meanwhile.
    pub fn patch<P, R>(&self, protect: &P, f: impl FnOnce(&Patch<'_>) -> R) -> R
    where
        P: WriteProtect + ?Sized,
    {
        let _writable = ProtectionGuard::new(protect);
        f(&Patch { table: self })
    }
}

/// Write access to a table while protection is lifted
pub struct Patch<'a> {
    table: &'a DispatchTable,
}

impl Patch<'_> {
    pub fn read_slot(&self, index: usize) -> usize {
        self.table.read_slot(index)
    }

    /// Single pointer-sized store; readers see either the old or the new value
    pub fn write_slot(&self, index: usize, value: usize) {
        self.table.slot(index).store(value, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protect::tests::RecordingProtect;

    #[test]
    fn null_base_is_rejected() {
        assert!(unsafe { DispatchTable::from_raw(std::ptr::null_mut()) }.is_none());
    }

    #[test]
    fn reads_and_writes_slots() {
        let mut slots = vec![0usize, 10, 20, 30].into_boxed_slice();
        let base = slots.as_mut_ptr();
        let table = unsafe { DispatchTable::from_raw(base) }.unwrap();
        assert_eq!(table.base(), base as usize);
        assert_eq!(table.read_slot(NR_OPEN), 20);

        let p = RecordingProtect::default();
        let old = table.patch(&p, |patch| {
            let old = patch.read_slot(NR_OPEN);
            patch.write_slot(NR_OPEN, 99);
            old
        });
        assert_eq!(old, 20);
        assert_eq!(table.read_slot(NR_OPEN), 99);
        assert_eq!(table.read_slot(NR_CLOSE), 30);
        assert_eq!(*p.log.borrow(), [false, true]);
        assert_eq!(slots[NR_OPEN], 99);
    }

    #[test]
    fn patch_without_store_still_pairs_toggles() {
        let mut slots = [1usize; 4];
        let table = unsafe { DispatchTable::from_raw(slots.as_mut_ptr()) }.unwrap();
        let p = RecordingProtect::default();
        table.patch(&p, |_| ());
        table.patch(&p, |_| ());
        assert_eq!(*p.log.borrow(), [false, true, false, true]);
    }
}
