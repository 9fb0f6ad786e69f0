//! Deterministic per-user encryption key derivation.
//!
//! The host shell keeps user data in encrypted stores keyed by a value the
//! auth core derives from the authenticated identity. The derivation must be
//! a pure function of the application namespace and the user's subject id:
//! a key derived after a token refresh or a process restart has to match the
//! key that encrypted data written last week. There is no randomness and no
//! fallback: a user without a usable subject id gets an error, never a
//! well-known key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{AuthError, Result};
use crate::types::UserInfo;

/// Derived storage-encryption key.
///
/// 32 bytes of SHA-256 output, carried as standard base64 (44 characters).
/// Redacted in all formatting output.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    /// The base64 key material.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Shape check: 44 characters of standard base64.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 44
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// External consumer of the derived key (the shell's encrypted-store layer).
///
/// `set_key` is called after login, callback handling, refresh, and state
/// restoration; `clear_key` on logout and session expiry.
pub trait EncryptionKeyConsumer: Send + Sync {
    fn set_key(&self, key: EncryptionKey);
    fn clear_key(&self);
}

/// Derive the storage-encryption key for an authenticated user.
///
/// The key is `base64(SHA-256("{app_key}:{sub}:encryption"))`; the same
/// input always yields the same key.
///
/// # Errors
///
/// Fails when `user.sub` is empty or whitespace. Key derivation never falls
/// back silently; without a stable subject the shell must not encrypt.
pub fn derive_encryption_key(app_key: &str, user: &UserInfo) -> Result<EncryptionKey> {
    let sub = user.sub.trim();
    if sub.is_empty() {
        return Err(AuthError::KeyDerivation(
            "user subject (sub) is required for key derivation".to_string(),
        ));
    }

    let app_key = app_key.trim();
    if app_key.is_empty() {
        return Err(AuthError::KeyDerivation(
            "app_key is required for key derivation".to_string(),
        ));
    }

    let derivation_input = format!("{}:{}:encryption", app_key, sub);

    let mut hasher = Sha256::new();
    hasher.update(derivation_input.as_bytes());
    let digest = hasher.finalize();

    Ok(EncryptionKey(STANDARD.encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(sub: &str) -> UserInfo {
        UserInfo {
            sub: sub.to_string(),
            name: Some("Test User".to_string()),
            email: Some("test@example.com".to_string()),
            avatar: None,
            provider: "mock".to_string(),
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_encryption_key("workbench", &user("u1")).unwrap();
        let b = derive_encryption_key("workbench", &user("u1")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_subjects_differ() {
        let a = derive_encryption_key("workbench", &user("u1")).unwrap();
        let b = derive_encryption_key("workbench", &user("u2")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_app_keys_differ() {
        let a = derive_encryption_key("workbench", &user("u1")).unwrap();
        let b = derive_encryption_key("other-app", &user("u1")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_profile_fields_other_than_sub_are_ignored() {
        let mut other = user("u1");
        other.name = Some("Renamed".to_string());
        other.email = None;

        let a = derive_encryption_key("workbench", &user("u1")).unwrap();
        let b = derive_encryption_key("workbench", &other).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_subject_rejected() {
        assert!(derive_encryption_key("workbench", &user("")).is_err());
        assert!(derive_encryption_key("workbench", &user("   ")).is_err());
    }

    #[test]
    fn test_key_shape() {
        let key = derive_encryption_key("workbench", &user("u1")).unwrap();
        assert!(key.is_valid());
        assert_eq!(key.expose().len(), 44);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_encryption_key("workbench", &user("u1")).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains(key.expose()));
        assert!(debug.contains("[REDACTED]"));
    }
}
