//! Write protection over the dispatch table
//!
//! The table normally sits in read-only memory. A patch lifts protection,
//! performs one pointer store and puts protection back. [`ProtectionGuard`]
//! owns that bracket so the re-enable cannot be skipped on any exit path.

use libc::c_void;
use nix::sys::mman::{self, ProtFlags};
use std::ptr::NonNull;

/// Toggle for the hardware or page-level write protection flag
pub trait WriteProtect {
    /// Global and idempotent; `false` makes the protected region writable
    fn set_protection(&self, enabled: bool);
}

impl<P: WriteProtect + ?Sized> WriteProtect for &P {
    fn set_protection(&self, enabled: bool) {
        (**self).set_protection(enabled)
    }
}

/// RAII guard for a writable window
pub struct ProtectionGuard<'a, P: WriteProtect + ?Sized> {
    protect: &'a P,
}

impl<'a, P: WriteProtect + ?Sized> ProtectionGuard<'a, P> {
    pub fn new(protect: &'a P) -> Self {
        protect.set_protection(false);
        Self { protect }
    }
}

impl<P: WriteProtect + ?Sized> Drop for ProtectionGuard<'_, P> {
    fn drop(&mut self) {
        self.protect.set_protection(true);
    }
}

/// WP flag of CR0
pub const CR0_WRITE_PROTECT: usize = 0x10000;

/// CR0 value with the WP flag set or cleared
pub fn cr0_with_write_protect(cr0: usize, enabled: bool) -> usize {
    if enabled {
        cr0 | CR0_WRITE_PROTECT
    } else {
        cr0 & !CR0_WRITE_PROTECT
    }
}

/// Supervisor write protection through CR0.WP
///
/// Only usable at ring 0; touching CR0 anywhere else faults.
#[cfg(target_arch = "x86_64")]
pub struct Cr0(());

#[cfg(target_arch = "x86_64")]
impl Cr0 {
    /// # Safety
    ///
    /// The caller must be running in ring 0.
    pub unsafe fn new() -> Self {
        Cr0(())
    }
}

#[cfg(target_arch = "x86_64")]
impl WriteProtect for Cr0 {
    fn set_protection(&self, enabled: bool) {
        use std::arch::asm;

        let cr0: usize;
        // SAFETY: `Cr0::new` requires ring 0
        unsafe {
            asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
            asm!(
                "mov cr0, {}",
                in(reg) cr0_with_write_protect(cr0, enabled),
                options(nostack, preserves_flags),
            );
        }
    }
}

/// Page protection through `mprotect`
///
/// Switches a mapping between `PROT_READ` and `PROT_READ | PROT_WRITE`.
#[derive(Clone, Copy, Debug)]
pub struct PageProtect {
    base: NonNull<c_void>,
    len: usize,
}

impl PageProtect {
    /// # Safety
    ///
    /// `base..base + len` must be a page-aligned mapping owned by the caller
    /// that stays mapped for as long as this value is used.
    pub unsafe fn new(base: NonNull<c_void>, len: usize) -> Self {
        Self { base, len }
    }
}

impl WriteProtect for PageProtect {
    fn set_protection(&self, enabled: bool) {
        let prot = if enabled {
            ProtFlags::PROT_READ
        } else {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        };
        // SAFETY: the mapping is owned and alive per `PageProtect::new`
        if let Err(e) = unsafe { mman::mprotect(self.base, self.len, prot) } {
            // A table that cannot be re-protected or restored is not recoverable.
            tracing::error!("failed to change protection of {:p}: {e}", self.base);
            std::process::abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records every toggle instead of touching memory
    #[derive(Default)]
    pub(crate) struct RecordingProtect {
        pub(crate) log: RefCell<Vec<bool>>,
    }

    impl WriteProtect for RecordingProtect {
        fn set_protection(&self, enabled: bool) {
            self.log.borrow_mut().push(enabled);
        }
    }

    #[test]
    fn write_protect_bit() {
        let cr0 = 0x8005_0033;
        assert_eq!(cr0_with_write_protect(cr0, false), 0x8004_0033);
        assert_eq!(cr0_with_write_protect(0x8004_0033, true), cr0);
        assert_eq!(cr0_with_write_protect(cr0, true), cr0);
        assert_eq!(cr0_with_write_protect(0x8004_0033, false), 0x8004_0033);
    }

    #[test]
    fn guard_brackets_scope() {
        let p = RecordingProtect::default();
        {
            let _g = ProtectionGuard::new(&p);
            assert_eq!(*p.log.borrow(), [false]);
        }
        assert_eq!(*p.log.borrow(), [false, true]);
    }

    #[test]
    fn guard_reenables_on_unwind() {
        let p = RecordingProtect::default();
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = ProtectionGuard::new(&p);
            panic!("store faulted");
        }));
        assert!(r.is_err());
        assert_eq!(*p.log.borrow(), [false, true]);
    }

    #[test]
    fn page_protect_makes_mapping_writable_and_back() {
        use std::num::NonZeroUsize;

        let len = NonZeroUsize::new(4096).unwrap();
        let base = unsafe {
            mman::mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ,
                mman::MapFlags::MAP_PRIVATE,
            )
        }
        .unwrap();
        let p = unsafe { PageProtect::new(base, len.get()) };
        {
            let _g = ProtectionGuard::new(&p);
            unsafe { base.cast::<usize>().write(0xfeed) };
        }
        assert_eq!(unsafe { base.cast::<usize>().read() }, 0xfeed);
        unsafe { mman::munmap(base, len.get()) }.unwrap();
    }
}
