use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    // Configuration failures surface at registration/initialization and keep
    // the offending provider out of the registry.
    #[error("Provider {provider} configuration invalid: {reason}")]
    Configuration { provider: String, reason: String },

    #[error("Provider {provider} authentication failed: {reason}")]
    AuthenticationFailed { provider: String, reason: String },

    // Protocol errors: always returned as values across the provider
    // boundary, never panics.
    #[error("Invalid state parameter - possible CSRF attack")]
    StateMismatch,

    #[error("No authorization code received")]
    MissingAuthCode,

    #[error("OAuth error: {error} - {description}")]
    CallbackError { error: String, description: String },

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Failed to fetch user info: {0}")]
    ProfileFetchFailed(String),

    // Storage errors: a blob that cannot be decrypted or parsed means "no
    // valid session", never a crash.
    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Credential cipher error: {0}")]
    Cipher(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(String),

    // Orchestration failures.
    #[error("Provider {0} not found")]
    UnknownProvider(String),

    #[error("No provider found for this callback URL")]
    NoProviderForCallback,

    #[error("Callback already processed")]
    CallbackAlreadyProcessed,

    #[error("No active provider for token refresh")]
    NoActiveProvider,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
