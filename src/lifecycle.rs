use crate::config::Config;
use crate::error::{Error, Result};
use crate::interceptor::{self, Hook};
use crate::locate::{self, Reference, ScanRange};
use crate::protect::WriteProtect;
use crate::table::{DispatchTable, NR_OPEN};
use std::sync::atomic::{AtomicBool, Ordering};

/// Installation state of the `open` hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Uninstalled,
    Installed,
}

/// Set while some `InterceptorState` owns the interceptor
///
/// `open_override` reads process-wide data, so only one installation can be
/// live at a time.
static CLAIMED: AtomicBool = AtomicBool::new(false);

struct Installation {
    table: DispatchTable,
    original: usize,
}

/// Owner of the hook: configuration, located table and original entry
///
/// [`activate`](Self::activate) and [`deactivate`](Self::deactivate) are the
/// only mutators. Dropping an installed state restores the table.
pub struct InterceptorState<P: WriteProtect> {
    config: Config,
    range: ScanRange,
    reference: Reference,
    protect: P,
    installed: Option<Installation>,
}

impl<P: WriteProtect> InterceptorState<P> {
    /// # Safety
    ///
    /// `range` must be readable for the whole life of this value, and
    /// `protect` must lift write protection over the table found in it.
    pub unsafe fn new(config: Config, range: ScanRange, reference: Reference, protect: P) -> Self {
        Self {
            config,
            range,
            reference,
            protect,
            installed: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> HookState {
        match self.installed {
            Some(_) => HookState::Installed,
            None => HookState::Uninstalled,
        }
    }

    /// Table the hook is installed into
    pub fn table(&self) -> Option<DispatchTable> {
        self.installed.as_ref().map(|i| i.table)
    }

    /// Entry that was in the `open` slot before installation
    pub fn original(&self) -> Option<usize> {
        self.installed.as_ref().map(|i| i.original)
    }

    /// Install the interceptor into the `open` slot
    ///
    /// On error nothing was written and the state is still `Uninstalled`.
    #[tracing::instrument(skip(self))]
    pub fn activate(&mut self) -> Result<()> {
        if self.installed.is_some() {
            return Err(Error::AlreadyInstalled);
        }
        let settings = self.config.validate()?;
        // SAFETY: readability of the range is a constructor requirement
        let table = unsafe { locate::locate(self.range, self.reference) }?;
        if CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyInstalled);
        }

        let original = table.patch(&self.protect, |patch| {
            let original = patch.read_slot(NR_OPEN);
            Hook::publish(settings, original);
            patch.write_slot(NR_OPEN, interceptor::address());
            original
        });
        tracing::debug!(
            "open slot of table {:#x}: {original:#x} -> {:#x}",
            table.base(),
            interceptor::address()
        );
        self.installed = Some(Installation { table, original });
        Ok(())
    }

    /// Put the original entry back; does nothing when not installed
    #[tracing::instrument(skip(self))]
    pub fn deactivate(&mut self) {
        let Some(Installation { table, original }) = self.installed.take() else {
            tracing::debug!("open hook not installed; nothing to restore");
            return;
        };
        table.patch(&self.protect, |patch| patch.write_slot(NR_OPEN, original));
        CLAIMED.store(false, Ordering::Release);
        tracing::debug!("open slot of table {:#x} restored", table.base());
    }
}

impl<P: WriteProtect> Drop for InterceptorState<P> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
