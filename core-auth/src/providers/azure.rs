//! Microsoft Azure AD provider (OAuth 2.0 v2.0 endpoints + Microsoft Graph).

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AuthError, Result};
use crate::provider::{AuthProvider, ExchangeMode, OAuth2Config, ProviderContext};
use crate::providers::oauth2::OAuth2Flow;
use crate::types::{AuthenticatedSession, CallbackRequest, LoginFlow, TokenSet, UserInfo};

const AUTHORITY_BASE: &str = "https://login.microsoftonline.com";
const GRAPH_ME_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Azure AD provider configuration.
#[derive(Debug, Clone)]
pub struct AzureConfig {
    pub client_id: String,
    /// Directory (tenant) id, or `common`/`organizations` for multi-tenant.
    pub tenant_id: String,
    pub redirect_uri: String,
}

/// Azure AD identity provider.
///
/// Uses the tenant-scoped v2.0 authorize/token endpoints and maps the
/// Microsoft Graph `/me` document to the profile shape.
pub struct AzureProvider {
    flow: OAuth2Flow,
    tenant_id: String,
    redirect_uri: String,
}

impl AzureProvider {
    pub const ID: &'static str = "azure";

    pub fn new(config: AzureConfig, ctx: ProviderContext) -> Self {
        let tenant = config.tenant_id.trim().to_string();
        let oauth = OAuth2Config {
            client_id: config.client_id,
            client_secret: None,
            allow_insecure_client_secret: false,
            redirect_uri: config.redirect_uri.clone(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
                "User.Read".to_string(),
            ],
            auth_url: format!("{}/{}/oauth2/v2.0/authorize", AUTHORITY_BASE, tenant),
            token_url: format!("{}/{}/oauth2/v2.0/token", AUTHORITY_BASE, tenant),
            userinfo_url: GRAPH_ME_URL.to_string(),
            exchange: ExchangeMode::Direct,
            extra_auth_params: vec![],
        };

        Self {
            flow: OAuth2Flow::new(Self::ID, oauth, ctx),
            tenant_id: tenant,
            redirect_uri: config.redirect_uri,
        }
    }

    /// Map a Microsoft Graph `/me` document to the profile shape.
    fn map_profile(&self, document: &serde_json::Value) -> Result<UserInfo> {
        let sub = document["id"].as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
            AuthError::ProfileFetchFailed("Graph /me document has no id".to_string())
        })?;

        // Personal accounts populate `mail`; work accounts may only have the
        // user principal name.
        let email = document["mail"]
            .as_str()
            .or_else(|| document["userPrincipalName"].as_str())
            .map(str::to_string);

        Ok(UserInfo {
            sub: sub.to_string(),
            name: document["displayName"].as_str().map(str::to_string),
            email,
            avatar: None,
            provider: Self::ID.to_string(),
        })
    }
}

#[async_trait]
impl AuthProvider for AzureProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn display_name(&self) -> &str {
        "Microsoft Azure AD"
    }

    async fn initialize(&self) -> Result<()> {
        if self.tenant_id.is_empty() {
            return Err(AuthError::Configuration {
                provider: Self::ID.to_string(),
                reason: "tenant_id is required".to_string(),
            });
        }
        self.flow.validate()?;
        debug!("Azure provider initialized");
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
        let user = self.map_profile(&document)?;
        Ok(AuthenticatedSession { tokens, user })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        self.flow.refresh(refresh_token).await
    }

    async fn logout(&self) -> Result<()> {
        let logout_url = format!(
            "{}/{}/oauth2/v2.0/logout?post_logout_redirect_uri={}",
            AUTHORITY_BASE,
            self.tenant_id,
            urlencoded(&self.redirect_uri)
        );
        self.flow.navigate_logout(&logout_url)
    }
}

fn urlencoded(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
