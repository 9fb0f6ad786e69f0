//! # Authentication Module
//!
//! Provider-agnostic OAuth 2.0 authentication and token lifecycle for the
//! workbench shell.
//!
//! ## Overview
//!
//! This crate orchestrates interactive sign-in across pluggable identity
//! providers (Azure AD, Google, and a mock provider for development), and
//! owns the credential lifecycle afterwards: encrypted persistence, proactive
//! refresh ahead of expiry, bounded retry with backoff, and coordinated
//! session-expiry escalation to the UI shell.
//!
//! ## Features
//!
//! - OAuth 2.0 authorization-code flows with PKCE (RFC 7636, S256)
//! - CSRF-hardened callback handling with single-use transaction state
//! - Encrypted at-rest credential storage (AES-256-GCM) over any
//!   [`bridge_traits::KeyValueStore`]
//! - Automatic token refresh with a 5-minute lead and sequential
//!   exponential backoff on failure
//! - Deterministic per-user encryption key derivation for the host's
//!   encrypted stores
//! - Auth state events over the [`core_runtime::EventBus`]

pub mod cipher;
pub mod error;
pub mod key_derivation;
pub mod manager;
pub mod pkce;
pub mod provider;
pub mod providers;
pub mod token_manager;
pub mod types;

pub use cipher::TokenCipher;
pub use error::{AuthError, Result};
pub use key_derivation::{derive_encryption_key, EncryptionKey, EncryptionKeyConsumer};
pub use manager::AuthManager;
pub use pkce::PkceVerifier;
pub use provider::{AuthProvider, ExchangeMode, OAuth2Config, ProviderContext, ProviderInfo};
pub use providers::{AzureConfig, AzureProvider, GoogleConfig, GoogleProvider, MockConfig, MockProvider};
pub use token_manager::TokenManager;
pub use types::{
    AuthenticatedSession, CallbackRequest, Credential, LoginFlow, TokenSet, UserInfo,
};
