//! Mock provider for development and tests.
//!
//! Completes the whole login locally: no redirect, no network. Used as the
//! default provider when no real identity backend is configured, and by the
//! test suites to drive the manager through full lifecycles.

use async_trait::async_trait;
use core_async::time::{now_millis, sleep, Duration};
use tracing::debug;

use crate::error::{AuthError, Result};
use crate::provider::AuthProvider;
use crate::types::{AuthenticatedSession, CallbackRequest, LoginFlow, TokenSet, UserInfo};

const ACCESS_TOKEN_PREFIX: &str = "mock_access_token_";
const REFRESHED_ACCESS_TOKEN_PREFIX: &str = "mock_access_token_refreshed_";
const REFRESH_TOKEN_PREFIX: &str = "mock_refresh_token_";

/// Mock provider configuration.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Artificial latency applied to each operation.
    pub simulate_delay_ms: u64,
    /// Make login attempts fail, for error-path testing.
    pub should_fail: bool,
    /// Profile returned on login.
    pub user_info: UserInfo,
    /// Token lifetime reported on login and refresh.
    pub expires_in: i64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            simulate_delay_ms: 1000,
            should_fail: false,
            user_info: UserInfo {
                sub: "mock-user-123".to_string(),
                name: Some("John Doe".to_string()),
                email: Some("john.doe@example.com".to_string()),
                avatar: Some("👨‍💻".to_string()),
                provider: MockProvider::ID.to_string(),
            },
            expires_in: 3600,
        }
    }
}

/// In-process identity provider that always "authenticates".
pub struct MockProvider {
    config: MockConfig,
}

impl MockProvider {
    pub const ID: &'static str = "mock";

    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    async fn simulate_latency(&self) {
        if self.config.simulate_delay_ms > 0 {
            sleep(Duration::from_millis(self.config.simulate_delay_ms)).await;
        }
    }

    fn mint_tokens(&self) -> TokenSet {
        let stamp = now_millis();
        TokenSet {
            access_token: format!("{}{}", ACCESS_TOKEN_PREFIX, stamp),
            refresh_token: Some(format!("{}{}", REFRESH_TOKEN_PREFIX, stamp)),
            expires_in: self.config.expires_in,
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

#[async_trait]
impl AuthProvider for MockProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn display_name(&self) -> &str {
        "Mock Provider"
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn login(&self) -> Result<LoginFlow> {
        self.simulate_latency().await;

        if self.config.should_fail {
            return Err(AuthError::AuthenticationFailed {
                provider: Self::ID.to_string(),
                reason: "Mock authentication failed (simulated)".to_string(),
            });
        }

        debug!("Mock login completed");

        let mut user = self.config.user_info.clone();
        user.provider = Self::ID.to_string();

        Ok(LoginFlow::Completed(AuthenticatedSession {
            tokens: self.mint_tokens(),
            user,
        }))
    }

    fn can_handle_callback(&self, _path: &str) -> bool {
        // The mock flow never leaves the application.
        false
    }

    async fn handle_callback(&self, _request: &CallbackRequest) -> Result<AuthenticatedSession> {
        Err(AuthError::NoProviderForCallback)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        self.simulate_latency().await;

        if !refresh_token.starts_with(REFRESH_TOKEN_PREFIX) {
            return Err(AuthError::RefreshFailed(
                "Invalid refresh token".to_string(),
            ));
        }

        Ok(TokenSet {
            access_token: format!("{}{}", REFRESHED_ACCESS_TOKEN_PREFIX, now_millis()),
            // Mock refresh tokens are not rotated.
            refresh_token: Some(refresh_token.to_string()),
            expires_in: self.config.expires_in,
        })
    }

    async fn logout(&self) -> Result<()> {
        self.simulate_latency().await;
        Ok(())
    }
}
