//! In-process syscall table to load the module into
//!
//! A private anonymous mapping of three pages: filler words, then a table
//! laid out like the x86_64 syscall table (512 slots, `open` at 2, `close`
//! at 3), then a trailing page. Every slot other than `open` and `close`
//! points at a stub returning `-ENOSYS`. The mapping is read-only except
//! while a [`PageProtect`] bracket has lifted protection, and calls are
//! dispatched by loading the slot, exactly as the kernel entry path does.

use crate::interceptor::OpenFn;
use crate::locate::{Reference, ScanRange};
use crate::protect::PageProtect;
use crate::table::{NR_CLOSE, NR_OPEN};
use anyhow::Context as _;
use libc::{c_char, c_int, c_long, c_uint, c_void, mode_t};
use nix::errno::Errno;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use std::ffi::CStr;
use std::mem;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Slots in the table
pub const TABLE_LEN: usize = 512;

type CloseFn = unsafe extern "C" fn(c_int) -> c_long;
type NiSyscallFn = unsafe extern "C" fn() -> c_long;

fn errno_result(ret: c_int) -> c_long {
    if ret < 0 {
        -(Errno::last_raw() as c_long)
    } else {
        ret as c_long
    }
}

unsafe extern "C" fn sys_open(path: *const c_char, flags: c_int, mode: mode_t) -> c_long {
    errno_result(unsafe { libc::open(path, flags, mode as c_uint) })
}

unsafe extern "C" fn sys_close(fd: c_int) -> c_long {
    errno_result(unsafe { libc::close(fd) })
}

unsafe extern "C" fn sys_ni_syscall() -> c_long {
    -(Errno::ENOSYS as c_long)
}

/// Address that identifies the table: the real `close` entry
pub fn reference() -> Reference {
    Reference {
        index: NR_CLOSE,
        address: sys_close as CloseFn as usize,
    }
}

/// Address of the unpatched `open` entry
pub fn original_open() -> usize {
    sys_open as OpenFn as usize
}

pub struct SyscallArena {
    base: NonNull<c_void>,
    len: usize,
    table: NonNull<usize>,
}

// SAFETY: slots are only read and written atomically; the mapping is owned
unsafe impl Send for SyscallArena {}
unsafe impl Sync for SyscallArena {}

impl SyscallArena {
    #[tracing::instrument]
    pub fn new() -> anyhow::Result<Self> {
        // SAFETY: sysconf has no preconditions
        let page = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            p if p > 0 => p as usize,
            _ => anyhow::bail!("failed to get page size"),
        };
        let table_bytes = TABLE_LEN * mem::size_of::<usize>();
        let table_pages = table_bytes.div_ceil(page);
        let len = (table_pages + 2) * page;
        let base = unsafe {
            mman::mmap_anonymous(
                None,
                NonZeroUsize::new(len).context("empty syscall arena")?,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
        }
        .context("failed to map syscall arena")?;

        let words = base.cast::<usize>();
        let filler = page / mem::size_of::<usize>();
        // SAFETY: the mapping is `len` bytes, writable and exclusively ours
        let table = unsafe {
            for i in 0..len / mem::size_of::<usize>() {
                words.add(i).write(0x6b6b_6b6b_0000_0000 | i);
            }
            let table = words.add(filler);
            for nr in 0..TABLE_LEN {
                table.add(nr).write(sys_ni_syscall as NiSyscallFn as usize);
            }
            table.add(NR_OPEN).write(original_open());
            table.add(NR_CLOSE).write(reference().address);
            table
        };
        let arena = Self { base, len, table };
        // SAFETY: the mapping is owned by `arena`
        unsafe { mman::mprotect(base, len, ProtFlags::PROT_READ) }
            .context("failed to write-protect syscall arena")?;
        tracing::debug!("syscall arena at {:p}, table at {:p}", base, table);
        Ok(arena)
    }

    /// Whole mapping, for the table scan
    pub fn scan_range(&self) -> ScanRange {
        let start = self.base.as_ptr() as usize;
        ScanRange::new(start, start + self.len)
    }

    /// Write protection over the whole mapping
    pub fn protect(&self) -> PageProtect {
        // SAFETY: mapping owned by `self`; users are borrowed from `self`
        unsafe { PageProtect::new(self.base, self.len) }
    }

    pub fn table_base(&self) -> usize {
        self.table.as_ptr() as usize
    }

    pub fn slot(&self, nr: usize) -> usize {
        assert!(nr < TABLE_LEN, "syscall {nr} out of range");
        // SAFETY: inside the table, aligned
        unsafe { AtomicUsize::from_ptr(self.table.as_ptr().add(nr)) }.load(Ordering::Acquire)
    }

    /// Dispatch `open` through the table
    pub fn open(&self, path: &CStr, flags: c_int, mode: mode_t) -> c_long {
        // SAFETY: the slot holds an `open` entry
        let f = unsafe { mem::transmute::<usize, OpenFn>(self.slot(NR_OPEN)) };
        unsafe { f(path.as_ptr(), flags, mode) }
    }

    /// Dispatch `close` through the table
    pub fn close(&self, fd: c_int) -> c_long {
        // SAFETY: the slot holds a `close` entry
        let f = unsafe { mem::transmute::<usize, CloseFn>(self.slot(NR_CLOSE)) };
        unsafe { f(fd) }
    }
}

impl Drop for SyscallArena {
    fn drop(&mut self) {
        // SAFETY: mapped in `new`, unmapped only here
        if let Err(e) = unsafe { mman::munmap(self.base, self.len) } {
            tracing::warn!("failed to unmap syscall arena: {e}");
        }
    }
}
