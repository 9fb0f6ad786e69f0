//! Browser Navigation Abstraction
//!
//! OAuth authorization flows leave the application: the provider login page
//! replaces the current view and control only returns through the redirect
//! callback. This trait makes that navigation an injected capability instead
//! of an ambient global, so the core can run under a desktop shell, a browser
//! shell, or a test harness.

use crate::error::Result;

/// Host-provided navigation capability.
///
/// `navigate` is fire-and-forget by contract: when the host is a browser the
/// page is being torn down as the call returns, so no completion can ever be
/// observed. Callers must not build logic that awaits anything beyond the
/// successful hand-off.
pub trait Navigator: Send + Sync {
    /// Perform a full navigation to `url` (authorization redirect,
    /// provider-side logout page).
    fn navigate(&self, url: &str) -> Result<()>;

    /// Replace the currently visible URL without navigating.
    ///
    /// Used to scrub OAuth query parameters (`code`, `state`) after a
    /// callback has been processed. Hosts without a visible URL bar
    /// implement this as a no-op.
    fn replace_url(&self, url: &str) -> Result<()>;
}
