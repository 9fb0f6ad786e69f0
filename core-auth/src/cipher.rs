//! At-rest encryption for the persisted credential blob.
//!
//! The serialized credential never reaches a key-value store in the clear:
//! it is sealed with AES-256-GCM under an application-scoped key derived from
//! the configured `app_key`. The key must be available before any user is
//! authenticated (the blob is decrypted during startup), which is why it is
//! application-scoped rather than derived from the user identity.
//!
//! Blob layout: `nonce (12 bytes) || ciphertext`.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{AuthError, Result};

const NONCE_SIZE: usize = 12;

/// Symmetric cipher for serialized token blobs.
#[derive(Clone)]
pub struct TokenCipher {
    key: [u8; 32],
}

impl TokenCipher {
    /// Derive the storage key from the application namespace.
    ///
    /// # Errors
    ///
    /// Rejects an empty `app_key`: encryption must never silently degrade to
    /// a well-known key.
    pub fn new(app_key: &str) -> Result<Self> {
        let app_key = app_key.trim();
        if app_key.is_empty() {
            return Err(AuthError::Cipher(
                "app_key is required for credential encryption".to_string(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(app_key.as_bytes());
        hasher.update(b":token-store");
        let key: [u8; 32] = hasher.finalize().into();

        Ok(Self { key })
    }

    /// Encrypt a plaintext blob. A fresh random nonce is generated per call
    /// and prepended to the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| AuthError::Cipher(format!("Encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Fails on truncated input, a wrong key, or any tampering (GCM
    /// authentication). Callers treat this as "no valid session".
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() <= NONCE_SIZE {
            return Err(AuthError::Cipher("Ciphertext too short".to_string()));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AuthError::Cipher(format!("Decryption failed: {}", e)))
    }
}

// The key never appears in debug output.
impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}
