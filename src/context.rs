//! Per-thread address limit switched around delegated calls
//!
//! The original open implementation validates its path argument against the
//! caller's address limit. The replacement path lives in module memory, so
//! the delegated call has to run with the kernel limit and the caller's
//! limit must come back afterwards no matter how the scope is left.
//!
//! In-process this is a model of the kernel's `set_fs(KERNEL_DS)` switch:
//! the limit is a thread-local that a delegate may consult through
//! [`current`]. The libc-backed entries of [`crate::host::SyscallArena`]
//! ignore it, since a user-space `open` has no address limit to enforce.

use std::cell::Cell;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressLimit {
    User,
    Kernel,
}

thread_local! {
    static ADDR_LIMIT: Cell<AddressLimit> = const { Cell::new(AddressLimit::User) };
}

/// Address limit of the calling thread
pub fn current() -> AddressLimit {
    ADDR_LIMIT.get()
}

/// RAII guard running its scope with the kernel address limit
pub struct KernelContext {
    saved: AddressLimit,
}

impl KernelContext {
    pub fn enter() -> Self {
        let saved = ADDR_LIMIT.replace(AddressLimit::Kernel);
        KernelContext { saved }
    }
}

impl Drop for KernelContext {
    fn drop(&mut self) {
        ADDR_LIMIT.set(self.saved);
    }
}
