//! Redirect `open` calls for selected file extensions
//!
//! The `open` entry of a syscall dispatch table is replaced with an
//! interceptor. Paths whose extension is one of up to five configured
//! extensions are opened as a single replacement file instead; every other
//! call reaches the original entry untouched. Unloading puts the original
//! entry back.
//!
//! The table is found by content ([`locate`]), patched through a
//! write-protection bracket ([`protect`], [`table`]) and owned by an
//! [`InterceptorState`]. [`host::SyscallArena`] provides an in-process table
//! to load into.

pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod host;
pub mod interceptor;
pub mod lifecycle;
pub mod locate;
pub mod module;
pub mod protect;
pub mod table;

pub use config::Config;
pub use error::{ConfigError, Error};
pub use lifecycle::{HookState, InterceptorState};
pub use module::RedirectModule;
