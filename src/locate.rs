//! Structural search for the syscall dispatch table
//!
//! There is no exported symbol for the table, so it is identified by
//! content: the candidate whose `close` slot holds the address of the real
//! `close` implementation is taken to be the table. This depends on the
//! layout of the running kernel and failing to find it is an ordinary
//! outcome on unsupported builds.

use crate::error::{Error, Result};
use crate::table::DispatchTable;
use std::mem;
use std::ptr;

/// Half-open address range the scan may read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    start: usize,
    end: usize,
}

impl ScanRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }
}

/// Slot whose content identifies the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub index: usize,
    pub address: usize,
}

/// Scan `range` at pointer strides for the first table matching `reference`
///
/// A candidate is only inspected when every slot up to the reference slot
/// lies inside the range.
///
/// # Safety
///
/// Every byte of `range` must be mapped and readable.
#[tracing::instrument(level = "debug")]
pub unsafe fn locate(range: ScanRange, reference: Reference) -> Result<DispatchTable> {
    let word = mem::size_of::<usize>();
    let span = (reference.index + 1) * word;
    let mut candidate = match range.start.checked_next_multiple_of(word) {
        Some(v) => v,
        None => return Err(Error::TableNotFound),
    };
    loop {
        match candidate.checked_add(span) {
            Some(limit) if limit <= range.end => {}
            _ => break,
        }
        let slots = candidate as *const usize;
        // SAFETY: inside the readable range and pointer aligned
        let entry = unsafe { ptr::read_volatile(slots.add(reference.index)) };
        if entry == reference.address {
            tracing::debug!("dispatch table found at {candidate:#x}");
            // SAFETY: aligned, non-null, inside the mapped range
            return unsafe { DispatchTable::from_raw(candidate as *mut usize) }
                .ok_or(Error::TableNotFound);
        }
        candidate += word;
    }
    tracing::debug!(
        "no dispatch table between {:#x} and {:#x}",
        range.start,
        range.end
    );
    Err(Error::TableNotFound)
}
