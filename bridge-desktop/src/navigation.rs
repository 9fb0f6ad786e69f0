//! System Browser Navigation
//!
//! Desktop rendition of the [`Navigator`] capability: authorization redirects
//! open in the user's default browser via the platform opener, and URL
//! scrubbing is a no-op because there is no visible address bar.

use bridge_traits::{
    error::{BridgeError, Result},
    navigation::Navigator,
};
use tracing::{debug, warn};

/// Opens URLs with the platform's default browser opener.
#[derive(Debug, Clone, Default)]
pub struct SystemNavigator;

impl SystemNavigator {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "macos")]
    const OPENER: &'static str = "open";
    #[cfg(target_os = "windows")]
    const OPENER: &'static str = "explorer";
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    const OPENER: &'static str = "xdg-open";
}

impl Navigator for SystemNavigator {
    fn navigate(&self, url: &str) -> Result<()> {
        // Refuse anything that is not an absolute http(s) URL; the opener
        // would otherwise happily launch arbitrary local targets.
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(BridgeError::OperationFailed(format!(
                "Refusing to open non-http URL: {}",
                url
            )));
        }

        debug!("Opening URL in system browser");

        // Fire-and-forget: the navigation contract never reports completion.
        match std::process::Command::new(Self::OPENER).arg(url).spawn() {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to spawn browser opener");
                Err(BridgeError::OperationFailed(format!(
                    "Failed to open browser: {}",
                    e
                )))
            }
        }
    }

    fn replace_url(&self, _url: &str) -> Result<()> {
        // No address bar on desktop; the OAuth query never becomes visible.
        debug!("replace_url is a no-op on desktop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_urls() {
        let navigator = SystemNavigator::new();
        assert!(navigator.navigate("file:///etc/passwd").is_err());
        assert!(navigator.navigate("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_replace_url_is_noop() {
        let navigator = SystemNavigator::new();
        assert!(navigator.replace_url("https://example.com/").is_ok());
    }
}
