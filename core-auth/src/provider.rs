//! The provider contract and shared OAuth 2.0 configuration.

use async_trait::async_trait;
use bridge_traits::{HttpClient, KeyValueStore, Navigator};
use core_runtime::config::CoreConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, Result};
use crate::types::{AuthenticatedSession, CallbackRequest, LoginFlow, TokenSet};

/// One identity backend's login/callback/refresh/logout protocol.
///
/// Implementations never panic for expected failures: protocol rejections,
/// network problems, and provider-side errors all come back as `Err` values.
///
/// A provider whose `initialize()` fails is evicted from the registry by
/// [`crate::AuthManager::initialize_providers`] and plays no further part.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Stable registry id (e.g. `"azure"`, `"google"`, `"mock"`).
    fn id(&self) -> &str;

    /// Human-readable name for provider pickers.
    fn display_name(&self) -> &str;

    /// Validate configuration and prepare the provider for use.
    async fn initialize(&self) -> Result<()>;

    /// Begin an interactive login.
    ///
    /// OAuth providers fire a full navigation to the authorization endpoint
    /// and return [`LoginFlow::Redirected`] synchronously; the navigation
    /// never "completes" from the caller's perspective. Providers that can
    /// finish without leaving the application return
    /// [`LoginFlow::Completed`].
    async fn login(&self) -> Result<LoginFlow>;

    /// Whether this provider owns the given callback path. Pure predicate.
    fn can_handle_callback(&self, path: &str) -> bool;

    /// Process a captured redirect: validate state, exchange the code,
    /// fetch the profile.
    async fn handle_callback(&self, request: &CallbackRequest) -> Result<AuthenticatedSession>;

    /// Exchange a refresh token for a fresh token set.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet>;

    /// Best-effort provider-side logout.
    async fn logout(&self) -> Result<()>;
}

/// Listing entry for provider pickers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
}

/// Shared capabilities handed to every provider at construction time.
#[derive(Clone)]
pub struct ProviderContext {
    pub http_client: Arc<dyn HttpClient>,
    pub navigator: Arc<dyn Navigator>,
    pub session_store: Arc<dyn KeyValueStore>,
    pub app_key: String,
}

impl ProviderContext {
    /// Extract the provider-facing capabilities from a core configuration.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            http_client: config.http_client.clone(),
            navigator: config.navigator.clone(),
            session_store: config.session_store.clone(),
            app_key: config.app_key.clone(),
        }
    }
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("app_key", &self.app_key)
            .finish()
    }
}

/// How an OAuth provider exchanges authorization codes and refresh tokens.
///
/// Exactly one mode is enabled per provider instance; the enum makes the
/// invariant structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeMode {
    /// Talk to the identity backend's token endpoint directly.
    Direct,
    /// Route the exchange through an application backend that holds the
    /// client secret.
    BackendProxy {
        /// Endpoint performing the authorization-code exchange.
        token_url: String,
        /// Endpoint performing refresh-grant exchanges; falls back to
        /// `token_url` when absent.
        refresh_url: Option<String>,
        /// Extra headers to send with proxy requests (API keys etc).
        headers: HashMap<String, String>,
    },
}

/// Configuration shared by the OAuth 2.0 provider variants.
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    /// Raw client secret for the direct exchange. Only honored when
    /// `allow_insecure_client_secret` is set; see [`OAuth2Config::validate`].
    pub client_secret: Option<String>,
    /// Explicit opt-in to hold (and transmit) a raw client secret from this
    /// client. Without it, configuration with a secret is rejected.
    pub allow_insecure_client_secret: bool,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub exchange: ExchangeMode,
    /// Additional authorization-URL parameters (e.g. `access_type=offline`).
    pub extra_auth_params: Vec<(String, String)>,
}

impl OAuth2Config {
    /// Validate the configuration for `provider_id`, failing fast on
    /// anything that must not reach a live flow.
    ///
    /// # Errors
    ///
    /// - required fields empty (`client_id`, `redirect_uri`, endpoint URLs)
    /// - `redirect_uri` unparseable (the callback path is derived from it)
    /// - a client secret present without `allow_insecure_client_secret`
    /// - a client secret present in backend-proxy mode (the secret belongs
    ///   on the backend)
    /// - backend-proxy mode with an empty proxy token URL
    pub fn validate(&self, provider_id: &str) -> Result<()> {
        let fail = |reason: &str| {
            Err(AuthError::Configuration {
                provider: provider_id.to_string(),
                reason: reason.to_string(),
            })
        };

        if self.client_id.trim().is_empty() {
            return fail("client_id is required");
        }
        if self.redirect_uri.trim().is_empty() {
            return fail("redirect_uri is required");
        }
        if url::Url::parse(&self.redirect_uri).is_err() {
            return fail("redirect_uri is not a valid URL");
        }
        if self.auth_url.trim().is_empty() || url::Url::parse(&self.auth_url).is_err() {
            return fail("auth_url is not a valid URL");
        }

        let secret = self
            .client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match &self.exchange {
            ExchangeMode::Direct => {
                if self.token_url.trim().is_empty() {
                    return fail("token_url is required for the direct exchange");
                }
                if secret.is_some() && !self.allow_insecure_client_secret {
                    return fail(
                        "client_secret detected but allow_insecure_client_secret is not \
                         enabled. Remove the secret or switch to a backend exchange.",
                    );
                }
            }
            ExchangeMode::BackendProxy { token_url, .. } => {
                if token_url.trim().is_empty() {
                    return fail("backend exchange enabled but the proxy token_url is missing");
                }
                if secret.is_some() {
                    return fail(
                        "client_secret must not be configured alongside the backend \
                         exchange; the secret belongs on the backend.",
                    );
                }
            }
        }

        if self.userinfo_url.trim().is_empty() {
            return fail("userinfo_url is required");
        }

        Ok(())
    }

    /// The secret to include in direct exchanges, honoring the opt-in flag.
    ///
    /// Returns `None` in backend-proxy mode or when the flag is unset, so a
    /// secret that slipped past validation can still never leak onto the
    /// wire.
    pub fn effective_secret(&self) -> Option<&str> {
        if !self.allow_insecure_client_secret {
            return None;
        }
        if !matches!(self.exchange, ExchangeMode::Direct) {
            return None;
        }
        self.client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Path component of the redirect URI; providers own callbacks whose
    /// path equals it.
    pub fn callback_path(&self) -> String {
        url::Url::parse(&self.redirect_uri)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }
}
