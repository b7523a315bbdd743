//! Load and unload entry points handed to the host
//!
//! Mirrors what a loadable kernel module reports: a status code from load
//! (0 on success, a negative errno otherwise) and an unload that cannot fail.

use crate::config::Config;
use crate::lifecycle::{HookState, InterceptorState};
use crate::locate::{Reference, ScanRange};
use crate::protect::WriteProtect;
use libc::c_int;

pub const MODULE_NAME: &str = "open_redirect";

pub struct RedirectModule<P: WriteProtect> {
    state: InterceptorState<P>,
}

impl<P: WriteProtect> RedirectModule<P> {
    /// # Safety
    ///
    /// Same requirements as [`InterceptorState::new`].
    pub unsafe fn new(config: Config, range: ScanRange, reference: Reference, protect: P) -> Self {
        Self {
            state: unsafe { InterceptorState::new(config, range, reference, protect) },
        }
    }

    pub fn state(&self) -> &InterceptorState<P> {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state.state() == HookState::Installed
    }

    pub fn on_load(&mut self) -> c_int {
        match self.state.activate() {
            Ok(()) => {
                tracing::info!("{MODULE_NAME} started");
                0
            }
            Err(e) => {
                tracing::error!("{MODULE_NAME}: {e}");
                e.status_code()
            }
        }
    }

    pub fn on_unload(&mut self) {
        self.state.deactivate();
        tracing::info!("{MODULE_NAME} stopped");
    }
}
