//! The function installed into the `open` slot
//!
//! # Safety
//!
//! [`open_override`] is entered from arbitrary threads with the same
//! contract as the call it replaces: `path` is either null or a valid
//! NUL-terminated string for the duration of the call.
#![allow(clippy::missing_safety_doc)]

use crate::config::Settings;
use crate::context::KernelContext;
use crate::filter::ExtensionSet;
use libc::{c_char, c_int, c_long, mode_t};
use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Signature of the hooked `open` entry
pub type OpenFn = unsafe extern "C" fn(*const c_char, c_int, mode_t) -> c_long;

// Thread-local recursion guard to prevent infinite recursion in the hook
thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// RAII guard for recursion protection
struct RecursionGuard;

impl RecursionGuard {
    /// Try to enter hook. Returns Some(guard) if not already in hook, None otherwise.
    fn try_enter() -> Option<Self> {
        if IN_HOOK.replace(true) {
            None
        } else {
            Some(RecursionGuard)
        }
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        IN_HOOK.set(false);
    }
}

/// Everything the interceptor reads on each call
pub(crate) struct Hook {
    replacement: CString,
    extensions: ExtensionSet,
    original: usize,
}

/// Most recently published hook
///
/// Hooks are never freed: a thread that loaded the slot just before it was
/// restored may still be running inside `open_override`. A hook equal to the
/// one being published is reused, so repeated install cycles with the same
/// settings allocate once.
static ACTIVE: AtomicPtr<Hook> = AtomicPtr::new(ptr::null_mut());

impl Hook {
    /// Make a hook for `settings` and `original` visible to the interceptor
    ///
    /// Callers must not publish concurrently; the lifecycle serializes this
    /// through its installation claim.
    pub(crate) fn publish(settings: Settings, original: usize) -> &'static Hook {
        // SAFETY: published hooks are leaked and live for the rest of the process
        if let Some(current) = unsafe { ACTIVE.load(Ordering::Acquire).as_ref() } {
            if current.replacement == settings.replacement
                && current.extensions == settings.extensions
                && current.original == original
            {
                return current;
            }
        }
        let hook: &'static Hook = Box::leak(Box::new(Hook {
            replacement: settings.replacement,
            extensions: settings.extensions,
            original,
        }));
        ACTIVE.store(ptr::from_ref(hook).cast_mut(), Ordering::Release);
        hook
    }

    fn original(&self) -> Option<OpenFn> {
        match self.original {
            0 => None,
            // SAFETY: only ever set from the `open` slot of a dispatch table
            addr => Some(unsafe { mem::transmute::<usize, OpenFn>(addr) }),
        }
    }
}

/// Address written into the `open` slot
pub fn address() -> usize {
    open_override as OpenFn as usize
}

/// Replacement for the `open` entry
///
/// Paths with a configured extension are opened as the replacement file;
/// everything else, including the delegate's errors, passes straight through.
pub unsafe extern "C" fn open_override(path: *const c_char, flags: c_int, mode: mode_t) -> c_long {
    // SAFETY: published hooks are leaked and live for the rest of the process
    let hook = match unsafe { ACTIVE.load(Ordering::Acquire).as_ref() } {
        Some(h) => h,
        None => return -(libc::ENOSYS as c_long),
    };
    let f = match hook.original() {
        Some(f) => f,
        None => return -(libc::ENOSYS as c_long),
    };

    let _guard = match RecursionGuard::try_enter() {
        Some(g) => g,
        None => return unsafe { f(path, flags, mode) },
    };

    if path.is_null() {
        return unsafe { f(path, flags, mode) };
    }
    let requested = unsafe { CStr::from_ptr(path) };
    if !hook.extensions.matches(requested.to_bytes()) {
        return unsafe { f(path, flags, mode) };
    }

    let fd = {
        let _kernel = KernelContext::enter();
        unsafe { f(hook.replacement.as_ptr(), flags, mode) }
    };
    tracing::info!("open_redirect intercepted {}", requested.to_string_lossy());
    fd
}
