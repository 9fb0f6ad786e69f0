//! Core data types for the authentication module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// Profile information for an authenticated user.
///
/// Produced by a provider's profile endpoint, passed through the manager,
/// and stored inside the persisted [`Credential`]. The `sub` field is the
/// stable subject identifier and is required for encryption key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Stable subject identifier assigned by the identity provider.
    pub sub: String,
    /// Display name, if the provider supplied one.
    pub name: Option<String>,
    /// Email address, if the provider supplied one.
    pub email: Option<String>,
    /// Avatar URL or glyph, if the provider supplied one.
    pub avatar: Option<String>,
    /// Id of the provider this profile came from.
    pub provider: String,
}

/// Wire-level token payload returned by a provider.
///
/// `expires_in` is the provider-reported lifetime in seconds. A zero or
/// negative value means the provider granted no usable session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The access token authorizing API calls.
    pub access_token: String,
    /// The refresh token, when the provider granted one.
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

// Tokens never appear in logs.
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// The credential owned by the token manager.
///
/// Created on successful login or refresh, refreshed in place on token
/// refresh, destroyed on logout or terminal session expiry. Persisted as
/// encrypted JSON with an ISO-8601 expiry.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub user_info: Option<UserInfo>,
}

impl Credential {
    /// Whether the access token has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Time remaining until expiry at `now`, or `None` if already expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        if now >= self.expiry {
            None
        } else {
            Some(self.expiry - now)
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .field("user_info", &self.user_info)
            .finish()
    }
}

/// A captured OAuth redirect, handed in by the host shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    /// Path component of the callback URL.
    pub path: String,
    /// Query parameters in arrival order.
    pub query: Vec<(String, String)>,
}

impl CallbackRequest {
    /// Parse a full callback URL into a request.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = url::Url::parse(raw)
            .map_err(|e| AuthError::CallbackError {
                error: "invalid_callback_url".to_string(),
                description: e.to_string(),
            })?;
        Ok(Self {
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        })
    }

    /// First value of a query parameter, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The raw query string, re-encoded. Used as the idempotency marker key
    /// so repeated delivery of the same callback is detectable.
    pub fn raw_query(&self) -> String {
        serde_urlencoded::to_string(&self.query).unwrap_or_default()
    }
}

/// Result of a provider login attempt.
#[derive(Debug, Clone)]
pub enum LoginFlow {
    /// A full navigation to the authorization endpoint has been fired.
    /// Control returns through the redirect callback; nothing further
    /// resolves on this code path.
    Redirected {
        /// The authorization URL the navigation was fired at.
        authorize_url: String,
    },
    /// The provider completed login without leaving the application.
    Completed(AuthenticatedSession),
}

/// Tokens plus profile, as produced by a successful callback or direct login.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub tokens: TokenSet,
    pub user: UserInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_credential_expiry_checks() {
        let now = Utc::now();
        let credential = Credential {
            access_token: "token".to_string(),
            refresh_token: None,
            expiry: now + Duration::hours(1),
            user_info: None,
        };

        assert!(!credential.is_expired(now));
        assert!(credential.is_expired(now + Duration::hours(2)));
        // Expiry boundary is exclusive for validity.
        assert!(credential.is_expired(credential.expiry));
    }

    #[test]
    fn test_credential_time_until_expiry() {
        let now = Utc::now();
        let credential = Credential {
            access_token: "token".to_string(),
            refresh_token: None,
            expiry: now + Duration::minutes(30),
            user_info: None,
        };

        let remaining = credential.time_until_expiry(now).unwrap();
        assert_eq!(remaining.num_minutes(), 30);
        assert!(credential
            .time_until_expiry(now + Duration::hours(1))
            .is_none());
    }

    #[test]
    fn test_credential_serialization_round_trip() {
        let credential = Credential {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expiry: Utc::now(),
            user_info: Some(UserInfo {
                sub: "user-1".to_string(),
                name: Some("Jane".to_string()),
                email: None,
                avatar: None,
                provider: "mock".to_string(),
            }),
        };

        let json = serde_json::to_string(&credential).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(back.access_token, credential.access_token);
        assert_eq!(back.refresh_token, credential.refresh_token);
        assert_eq!(back.expiry, credential.expiry);
        assert_eq!(back.user_info, credential.user_info);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = TokenSet {
            access_token: "secret_access".to_string(),
            refresh_token: Some("secret_refresh".to_string()),
            expires_in: 3600,
        };
        let debug = format!("{:?}", tokens);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret_access"));
        assert!(!debug.contains("secret_refresh"));
    }

    #[test]
    fn test_callback_request_from_url() {
        let request =
            CallbackRequest::from_url("https://localhost/auth/callback?code=abc&state=xyz")
                .unwrap();
        assert_eq!(request.path, "/auth/callback");
        assert_eq!(request.param("code"), Some("abc"));
        assert_eq!(request.param("state"), Some("xyz"));
        assert_eq!(request.param("missing"), None);
    }

    #[test]
    fn test_callback_request_rejects_garbage() {
        assert!(CallbackRequest::from_url("not a url").is_err());
    }

    #[test]
    fn test_raw_query_stable_for_identical_requests() {
        let a = CallbackRequest::from_url("https://h/cb?code=1&state=2").unwrap();
        let b = CallbackRequest::from_url("https://h/cb?code=1&state=2").unwrap();
        assert_eq!(a.raw_query(), b.raw_query());
    }
}
