//! Google provider (Google OAuth 2.0 + OIDC userinfo).

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::provider::{AuthProvider, ExchangeMode, OAuth2Config, ProviderContext};
use crate::providers::oauth2::OAuth2Flow;
use crate::types::{AuthenticatedSession, CallbackRequest, LoginFlow, TokenSet, UserInfo};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const LOGOUT_URL: &str = "https://accounts.google.com/logout";

/// Backend-proxied exchange endpoints for deployments that keep the client
/// secret server-side.
#[derive(Debug, Clone)]
pub struct BackendExchangeConfig {
    /// Endpoint performing the authorization-code exchange.
    pub token_url: String,
    /// Endpoint performing refresh-grant exchanges; defaults to `token_url`.
    pub refresh_url: Option<String>,
    /// Extra headers for proxy requests.
    pub headers: HashMap<String, String>,
}

/// Google provider configuration.
#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    pub client_id: String,
    pub redirect_uri: String,
    /// Raw client secret for the direct exchange. Rejected at initialization
    /// unless `allow_insecure_client_secret` is set.
    pub client_secret: Option<String>,
    /// Explicit opt-in to hold the raw client secret in this client.
    pub allow_insecure_client_secret: bool,
    /// When present, code and refresh exchanges go through the backend and
    /// no secret may be configured here.
    pub backend_exchange: Option<BackendExchangeConfig>,
}

/// Google identity provider.
///
/// Requests offline access with a forced consent prompt so a refresh token
/// is granted, and maps the OIDC userinfo document to the profile shape.
pub struct GoogleProvider {
    flow: OAuth2Flow,
}

impl GoogleProvider {
    pub const ID: &'static str = "google";

    pub fn new(config: GoogleConfig, ctx: ProviderContext) -> Self {
        let exchange = match config.backend_exchange {
            Some(backend) => ExchangeMode::BackendProxy {
                token_url: backend.token_url,
                refresh_url: backend.refresh_url,
                headers: backend.headers,
            },
            None => ExchangeMode::Direct,
        };

        let oauth = OAuth2Config {
            client_id: config.client_id,
            client_secret: config.client_secret,
            allow_insecure_client_secret: config.allow_insecure_client_secret,
            redirect_uri: config.redirect_uri,
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
            exchange,
            extra_auth_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        };

        Self {
            flow: OAuth2Flow::new(Self::ID, oauth, ctx),
        }
    }

    /// Map an OIDC userinfo document to the profile shape.
    fn map_profile(document: &serde_json::Value) -> Result<UserInfo> {
        let sub = document["sub"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| crate::error::AuthError::ProfileFetchFailed(
                "userinfo document has no sub".to_string(),
            ))?;

        Ok(UserInfo {
            sub: sub.to_string(),
            name: document["name"].as_str().map(str::to_string),
            email: document["email"].as_str().map(str::to_string),
            avatar: document["picture"].as_str().map(str::to_string),
            provider: Self::ID.to_string(),
        })
    }
}

#[async_trait]
impl AuthProvider for GoogleProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn display_name(&self) -> &str {
        "Google"
    }

    async fn initialize(&self) -> Result<()> {
        self.flow.validate()?;
        debug!("Google provider initialized");
        Ok(())
    }

    async fn login(&self) -> Result<LoginFlow> {
        self.flow.begin_login().await
    }

    fn can_handle_callback(&self, path: &str) -> bool {
        self.flow.can_handle_callback(path)
    }

    async fn handle_callback(&self, request: &CallbackRequest) -> Result<AuthenticatedSession> {
        let tokens = self.flow.callback_tokens(request).await?;
        let document = self.flow.fetch_profile(&tokens.access_token).await?;
        let user = Self::map_profile(&document)?;
        Ok(AuthenticatedSession { tokens, user })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        self.flow.refresh(refresh_token).await
    }

    async fn logout(&self) -> Result<()> {
        // Google has no app-scoped sign-out; the account chooser page is the
        // closest fire-and-forget equivalent.
        self.flow.navigate_logout(LOGOUT_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::providers::mock::tests_support::null_context;

    fn config() -> GoogleConfig {
        GoogleConfig {
            client_id: "google-client".to_string(),
            redirect_uri: "https://localhost:5173/auth/google/callback".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_initialize_plain_config() {
        let provider = GoogleProvider::new(config(), null_context());
        assert!(provider.initialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_secret_without_opt_in_fails_initialization() {
        let provider = GoogleProvider::new(
            GoogleConfig {
                client_secret: Some("shhh".to_string()),
                ..config()
            },
            null_context(),
        );
        assert!(matches!(
            provider.initialize().await,
            Err(AuthError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_secret_with_opt_in_initializes() {
        let provider = GoogleProvider::new(
            GoogleConfig {
                client_secret: Some("shhh".to_string()),
                allow_insecure_client_secret: true,
                ..config()
            },
            null_context(),
        );
        assert!(provider.initialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_backend_exchange_requires_token_url() {
        let provider = GoogleProvider::new(
            GoogleConfig {
                backend_exchange: Some(BackendExchangeConfig {
                    token_url: "".to_string(),
                    refresh_url: None,
                    headers: HashMap::new(),
                }),
                ..config()
            },
            null_context(),
        );
        assert!(provider.initialize().await.is_err());
    }

    #[tokio::test]
    async fn test_login_requests_offline_access() {
        let provider = GoogleProvider::new(config(), null_context());
        let LoginFlow::Redirected { authorize_url } = provider.login().await.unwrap() else {
            panic!("expected a redirect");
        };
        assert!(authorize_url.starts_with(AUTH_URL));
        assert!(authorize_url.contains("access_type=offline"));
        assert!(authorize_url.contains("prompt=consent"));
    }

    #[test]
    fn test_callback_ownership() {
        let provider = GoogleProvider::new(config(), null_context());
        assert!(provider.can_handle_callback("/auth/google/callback"));
        assert!(!provider.can_handle_callback("/auth/azure/callback"));
    }

    #[test]
    fn test_profile_mapping() {
        let document = serde_json::json!({
            "sub": "108723456789",
            "name": "Jane Engineer",
            "email": "jane@gmail.com",
            "picture": "https://lh3.googleusercontent.com/a/photo"
        });

        let user = GoogleProvider::map_profile(&document).unwrap();
        assert_eq!(user.sub, "108723456789");
        assert_eq!(user.name.as_deref(), Some("Jane Engineer"));
        assert_eq!(user.email.as_deref(), Some("jane@gmail.com"));
        assert_eq!(
            user.avatar.as_deref(),
            Some("https://lh3.googleusercontent.com/a/photo")
        );
        assert_eq!(user.provider, "google");
    }

    #[test]
    fn test_profile_without_sub_rejected() {
        let document = serde_json::json!({ "name": "Nobody" });
        assert!(GoogleProvider::map_profile(&document).is_err());
    }
}
