//! OAuth 2.0 authorization-code engine with PKCE (RFC 6749 + RFC 7636).
//!
//! The engine owns everything the concrete providers share: building the
//! authorization URL, persisting and consuming the PKCE transaction,
//! validating callback state, exchanging codes, refreshing tokens, and
//! fetching the profile document. Provider variants contribute endpoints,
//! scopes, and the profile mapping.
//!
//! # Security
//!
//! - Cryptographically random state and code verifier per login attempt
//! - State validation fails closed; the token endpoint is never contacted
//!   for a callback that cannot present the stored state
//! - Sensitive values (tokens, codes, verifiers) are never logged

use bridge_traits::http::{HttpMethod, HttpRequest};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{AuthError, Result};
use crate::pkce::{PkceStore, PkceVerifier};
use crate::provider::{ExchangeMode, OAuth2Config, ProviderContext};
use crate::types::{CallbackRequest, LoginFlow, TokenSet};

/// Token endpoint response, as defined by RFC 6749 §5.1.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[allow(dead_code)]
    token_type: Option<String>,
    #[allow(dead_code)]
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// Error payload many token endpoints return alongside a 4xx status.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

/// Shared authorization-code flow, parameterized per provider.
pub struct OAuth2Flow {
    provider_id: String,
    config: OAuth2Config,
    ctx: ProviderContext,
    pkce: PkceStore,
    callback_path: String,
}

impl OAuth2Flow {
    pub fn new(provider_id: &str, config: OAuth2Config, ctx: ProviderContext) -> Self {
        let pkce = PkceStore::new(ctx.session_store.clone(), &ctx.app_key, provider_id);
        let callback_path = config.callback_path();
        Self {
            provider_id: provider_id.to_string(),
            config,
            ctx,
            pkce,
            callback_path,
        }
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Fail-fast configuration validation; called from provider
    /// `initialize()` so broken providers are evicted before any flow runs.
    pub fn validate(&self) -> Result<()> {
        self.config.validate(&self.provider_id)
    }

    pub fn can_handle_callback(&self, path: &str) -> bool {
        !self.callback_path.is_empty() && path == self.callback_path
    }

    /// Build the authorization URL, persist the PKCE transaction, and fire
    /// the redirect.
    ///
    /// The PKCE material is persisted before the navigation so the callback
    /// can find it even though this call never "completes" in a browser
    /// host.
    #[instrument(skip(self), fields(provider = %self.provider_id))]
    pub async fn begin_login(&self) -> Result<LoginFlow> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut authorize_url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Configuration {
                provider: self.provider_id.clone(),
                reason: format!("Invalid auth URL: {}", e),
            })?;

        {
            let mut query = authorize_url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            for (key, value) in &self.config.extra_auth_params {
                query.append_pair(key, value);
            }
        }

        self.pkce.save(&verifier).await?;

        debug!("Redirecting to authorization endpoint");

        // Fire-and-forget: in a browser host the page is gone after this.
        self.ctx
            .navigator
            .navigate(authorize_url.as_str())
            .map_err(|e| AuthError::Network(format!("Failed to launch redirect: {}", e)))?;

        Ok(LoginFlow::Redirected {
            authorize_url: authorize_url.into(),
        })
    }

    /// Validate a captured callback and exchange its code for tokens.
    ///
    /// Validation order matters: the provider error parameter is surfaced
    /// first, then the stored state must match exactly (missing or stale
    /// state is a hard rejection and no exchange happens), then the code is
    /// required.
    #[instrument(skip(self, request), fields(provider = %self.provider_id))]
    pub async fn callback_tokens(&self, request: &CallbackRequest) -> Result<TokenSet> {
        if let Some(error) = request.param("error") {
            let description = request.param("error_description").unwrap_or_default();
            warn!(error = %error, "Authorization endpoint returned an error");
            return Err(AuthError::CallbackError {
                error: error.to_string(),
                description: description.to_string(),
            });
        }

        let stored = self.pkce.consume().await?.ok_or_else(|| {
            warn!("No stored OAuth state for callback - rejecting");
            AuthError::StateMismatch
        })?;

        let state = request.param("state").ok_or_else(|| {
            warn!("Callback carries no state parameter - rejecting");
            AuthError::StateMismatch
        })?;

        if state != stored.state() {
            warn!("OAuth state mismatch - rejecting callback");
            return Err(AuthError::StateMismatch);
        }

        let code = request.param("code").ok_or(AuthError::MissingAuthCode)?;

        self.exchange_code(code, stored.verifier()).await
    }

    /// Exchange an authorization code + verifier for tokens.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet> {
        debug!("Exchanging authorization code for tokens");

        let request = match &self.config.exchange {
            ExchangeMode::Direct => {
                let mut params = vec![
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", &self.config.redirect_uri),
                    ("client_id", &self.config.client_id),
                    ("code_verifier", code_verifier),
                ];
                if let Some(secret) = self.config.effective_secret() {
                    params.push(("client_secret", secret));
                }
                Self::form_request(&self.config.token_url, &params)?
            }
            ExchangeMode::BackendProxy {
                token_url, headers, ..
            } => {
                let body = serde_json::json!({
                    "code": code,
                    "code_verifier": code_verifier,
                    "redirect_uri": self.config.redirect_uri,
                    "client_id": self.config.client_id,
                    "provider": self.provider_id,
                });
                Self::proxy_request(token_url, headers, &body)?
            }
        };

        let response = self
            .ctx
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            let reason = Self::endpoint_error(response.status, &response.body);
            warn!(status = response.status, "Token exchange failed");
            return Err(AuthError::ExchangeFailed(reason));
        }

        let payload: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Serialization(format!("token response: {}", e)))?;

        debug!(
            expires_in = payload.expires_in,
            has_refresh_token = payload.refresh_token.is_some(),
            "Token exchange completed"
        );

        Ok(TokenSet {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_in: payload.expires_in,
        })
    }

    /// Refresh-grant exchange. A response without a rotated refresh token
    /// keeps the one that was presented.
    #[instrument(skip(self, refresh_token), fields(provider = %self.provider_id))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        debug!("Refreshing access token");

        let request = match &self.config.exchange {
            ExchangeMode::Direct => {
                let mut params = vec![
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", &self.config.client_id),
                ];
                if let Some(secret) = self.config.effective_secret() {
                    params.push(("client_secret", secret));
                }
                Self::form_request(&self.config.token_url, &params)?
            }
            ExchangeMode::BackendProxy {
                token_url,
                refresh_url,
                headers,
            } => {
                let body = serde_json::json!({
                    "refresh_token": refresh_token,
                    "client_id": self.config.client_id,
                    "provider": self.provider_id,
                });
                let endpoint = refresh_url.as_deref().unwrap_or(token_url);
                Self::proxy_request(endpoint, headers, &body)?
            }
        };

        let response = self
            .ctx
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            let reason = Self::endpoint_error(response.status, &response.body);
            warn!(status = response.status, "Token refresh failed");
            return Err(AuthError::RefreshFailed(reason));
        }

        let payload: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Serialization(format!("token response: {}", e)))?;

        Ok(TokenSet {
            access_token: payload.access_token,
            refresh_token: payload
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            expires_in: payload.expires_in,
        })
    }

    /// Fetch the raw profile document with a bearer token.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<serde_json::Value> {
        let request = HttpRequest::new(HttpMethod::Get, self.config.userinfo_url.clone())
            .bearer_token(access_token);

        let response = self
            .ctx
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthError::ProfileFetchFailed(format!(
                "userinfo endpoint returned {}",
                response.status
            )));
        }

        response
            .json()
            .map_err(|e| AuthError::Serialization(format!("profile response: {}", e)))
    }

    /// Fire the provider-side logout navigation, when the variant has one.
    pub fn navigate_logout(&self, logout_url: &str) -> Result<()> {
        self.ctx
            .navigator
            .navigate(logout_url)
            .map_err(|e| AuthError::Network(format!("Failed to launch logout: {}", e)))
    }

    fn form_request(url: &str, params: &[(&str, &str)]) -> Result<HttpRequest> {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Serialization(format!("token request: {}", e)))?;
        Ok(HttpRequest::new(HttpMethod::Post, url).form(Bytes::from(encoded)))
    }

    fn proxy_request(
        url: &str,
        headers: &HashMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<HttpRequest> {
        let mut request = HttpRequest::new(HttpMethod::Post, url)
            .json(body)
            .map_err(|e| AuthError::Serialization(format!("proxy request: {}", e)))?;
        for (key, value) in headers {
            request = request.header(key.clone(), value.clone());
        }
        Ok(request)
    }

    /// Normalize a token endpoint failure into a readable reason without
    /// echoing anything sensitive.
    fn endpoint_error(status: u16, body: &[u8]) -> String {
        if let Ok(payload) = serde_json::from_slice::<TokenErrorResponse>(body) {
            let detail = payload
                .error_description
                .or(payload.error)
                .or(payload.message);
            if let Some(detail) = detail {
                return format!("endpoint returned {}: {}", status, detail);
            }
        }
        match std::str::from_utf8(body) {
            Ok(text) if !text.trim().is_empty() => {
                format!("endpoint returned {}: {}", status, text.trim())
            }
            _ => format!("endpoint returned {}", status),
        }
    }
}
