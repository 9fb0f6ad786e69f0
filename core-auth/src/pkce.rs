//! PKCE (RFC 7636) transaction material.
//!
//! Every login attempt gets a fresh CSRF `state` and code verifier. Both are
//! persisted under provider-scoped keys in the session store for the duration
//! of the redirect round-trip, and consumed exactly once by the matching
//! callback. A callback that cannot present the stored state fails closed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::kv::KeyValueStore;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, Result};

/// PKCE verifier plus the CSRF state for one login attempt.
///
/// The verifier must never be transmitted to the authorization endpoint; only
/// the derived challenge is. Both values use URL-safe base64 without padding.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Create a new verifier with cryptographically secure random values:
    /// a 32-byte code verifier and a 16-byte state.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        // 43-128 characters per RFC 7636; 32 bytes encodes to 43.
        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    /// Rebuild a verifier from persisted parts.
    pub fn from_parts(verifier: String, state: String) -> Self {
        Self { verifier, state }
    }

    /// The code verifier string.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The CSRF state parameter.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// The S256 code challenge: BASE64URL(SHA256(code_verifier)).
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Provider-scoped persistence for an in-flight PKCE transaction.
pub struct PkceStore {
    store: Arc<dyn KeyValueStore>,
    state_key: String,
    verifier_key: String,
}

impl PkceStore {
    pub fn new(store: Arc<dyn KeyValueStore>, app_key: &str, provider_id: &str) -> Self {
        Self {
            store,
            state_key: format!("{}:{}:oauth_state", app_key, provider_id),
            verifier_key: format!("{}:{}:oauth_code_verifier", app_key, provider_id),
        }
    }

    /// Persist the transaction for the redirect round-trip. Any previous
    /// transaction for the same provider is overwritten.
    pub async fn save(&self, verifier: &PkceVerifier) -> Result<()> {
        self.store
            .set(&self.state_key, verifier.state().as_bytes())
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        self.store
            .set(&self.verifier_key, verifier.verifier().as_bytes())
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Take the stored transaction, deleting it so it can be used only once.
    ///
    /// Returns `Ok(None)` when no transaction is stored (expired session
    /// store, or a callback that was never preceded by a login).
    pub async fn consume(&self) -> Result<Option<PkceVerifier>> {
        let state = self
            .store
            .get(&self.state_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        let verifier = self
            .store
            .get(&self.verifier_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        self.store
            .delete(&self.state_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        self.store
            .delete(&self.verifier_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        match (state, verifier) {
            (Some(state), Some(verifier)) => {
                let state = String::from_utf8(state)
                    .map_err(|_| AuthError::Storage("stored state is not UTF-8".to_string()))?;
                let verifier = String::from_utf8(verifier)
                    .map_err(|_| AuthError::Storage("stored verifier is not UTF-8".to_string()))?;
                Ok(Some(PkceVerifier::from_parts(verifier, state)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct MockStore {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for MockStore {
        async fn set(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            self.entries
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn delete(&self, key: &str) -> BridgeResult<()> {
            self.entries.lock().await.remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(self.entries.lock().await.keys().cloned().collect())
        }

        async fn clear(&self) -> BridgeResult<()> {
            self.entries.lock().await.clear();
            Ok(())
        }
    }

    #[test]
    fn test_verifier_generation() {
        let verifier = PkceVerifier::new();

        assert!(!verifier.verifier().is_empty());
        assert!(!verifier.state().is_empty());

        // Challenge is deterministic for the same verifier.
        assert_eq!(verifier.challenge(), verifier.challenge());

        // Fresh verifiers differ in every component.
        let other = PkceVerifier::new();
        assert_ne!(verifier.verifier(), other.verifier());
        assert_ne!(verifier.state(), other.state());
        assert_ne!(verifier.challenge(), other.challenge());
    }

    #[test]
    fn test_challenge_is_unpadded_url_safe() {
        let verifier = PkceVerifier::from_parts(
            "test_verifier".to_string(),
            "test_state".to_string(),
        );

        let challenge = verifier.challenge();
        assert!(!challenge.contains('+'));
        assert!(!challenge.contains('/'));
        assert!(!challenge.contains('='));
    }

    #[test]
    fn test_known_challenge_vector() {
        // RFC 7636 appendix B test vector.
        let verifier = PkceVerifier::from_parts(
            "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            String::new(),
        );
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_debug_redacts_verifier() {
        let verifier = PkceVerifier::new();
        let debug = format!("{:?}", verifier);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(verifier.verifier()));
    }

    #[tokio::test]
    async fn test_save_and_consume_once() {
        let store = Arc::new(MockStore::new());
        let pkce = PkceStore::new(store, "workbench", "google");

        let verifier = PkceVerifier::new();
        pkce.save(&verifier).await.unwrap();

        let restored = pkce.consume().await.unwrap().unwrap();
        assert_eq!(restored.state(), verifier.state());
        assert_eq!(restored.verifier(), verifier.verifier());

        // Second consume finds nothing: the transaction is single-use.
        assert!(pkce.consume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consume_without_save() {
        let store = Arc::new(MockStore::new());
        let pkce = PkceStore::new(store, "workbench", "azure");
        assert!(pkce.consume().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transactions_are_provider_scoped() {
        let store = Arc::new(MockStore::new());
        let google = PkceStore::new(store.clone(), "workbench", "google");
        let azure = PkceStore::new(store, "workbench", "azure");

        let verifier = PkceVerifier::new();
        google.save(&verifier).await.unwrap();

        assert!(azure.consume().await.unwrap().is_none());
        assert!(google.consume().await.unwrap().is_some());
    }
}
