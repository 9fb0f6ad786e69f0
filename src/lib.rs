//! Workspace placeholder crate.
//!
//! This crate exists to expose the workbench authentication stack behind a
//! single dependency. Host applications can depend on `workbench-auth` with
//! the `desktop` feature and get the auth core plus the desktop bridge
//! implementations without wiring each crate individually.

#[cfg(feature = "desktop")]
pub use bridge_desktop;
#[cfg(feature = "desktop")]
pub use core_auth;
#[cfg(feature = "desktop")]
pub use core_runtime;
