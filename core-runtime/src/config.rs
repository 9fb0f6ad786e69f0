//! # Core Configuration Module
//!
//! Provides configuration management for the workbench auth core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`CoreConfig`] instance holding the host-provided bridges and settings the
//! core needs. It enforces fail-fast validation so a missing capability is a
//! descriptive startup error instead of a latent runtime panic.
//!
//! ## Required Dependencies
//!
//! - `app_key` - Application namespace; scopes storage keys and the
//!   encryption key derivation. Must be non-empty.
//! - `HttpClient` - OAuth token/profile endpoint access
//! - `Navigator` - Authorization redirects and URL scrubbing
//! - Session-scoped `KeyValueStore` - PKCE transactions and callback markers
//!
//! ## Conditional Dependencies
//!
//! - Durable `KeyValueStore` - required when `CredentialStoreScope::Durable`
//! - In-memory `KeyValueStore` - required when `CredentialStoreScope::InMemory`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, CredentialStoreScope};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .app_key("workbench")
//!     .http_client(Arc::new(MyHttpClient))
//!     .navigator(Arc::new(MyNavigator))
//!     .session_store(Arc::new(MySessionStore))
//!     .durable_store(Arc::new(MyDurableStore))
//!     .credential_store_scope(CredentialStoreScope::Durable)
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, HttpClient, KeyValueStore, Navigator, SystemClock};
use std::sync::Arc;

/// Where the encrypted credential blob lives.
///
/// The scope decides whether an authenticated session survives a process
/// restart (`Durable`), one host session (`SessionScoped`), or nothing at all
/// (`InMemory`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialStoreScope {
    /// Durable-across-restarts store.
    #[default]
    Durable,
    /// Session-scoped store; the credential dies with the host session.
    SessionScoped,
    /// In-memory-only store; for tests and ephemeral setups.
    InMemory,
}

/// Core configuration for the workbench auth core.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Application namespace for storage keys and key derivation.
    pub app_key: String,

    /// HTTP client for OAuth endpoint calls.
    pub http_client: Arc<dyn HttpClient>,

    /// Host navigation capability.
    pub navigator: Arc<dyn Navigator>,

    /// Session-scoped store (PKCE transactions, callback markers).
    pub session_store: Arc<dyn KeyValueStore>,

    /// Durable store, when provided.
    pub durable_store: Option<Arc<dyn KeyValueStore>>,

    /// In-memory store, when provided.
    pub memory_store: Option<Arc<dyn KeyValueStore>>,

    /// Which store holds the encrypted credential blob.
    pub credential_store_scope: CredentialStoreScope,

    /// Time source; defaults to the system clock.
    pub clock: Arc<dyn Clock>,

    /// Event bus buffer capacity.
    pub event_buffer: usize,
}

impl CoreConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Resolves the store the credential blob is persisted in, according to
    /// the configured scope.
    pub fn credential_store(&self) -> Arc<dyn KeyValueStore> {
        match self.credential_store_scope {
            CredentialStoreScope::Durable => self
                .durable_store
                .clone()
                .expect("validated at build time"),
            CredentialStoreScope::SessionScoped => self.session_store.clone(),
            CredentialStoreScope::InMemory => self
                .memory_store
                .clone()
                .expect("validated at build time"),
        }
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    app_key: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    navigator: Option<Arc<dyn Navigator>>,
    session_store: Option<Arc<dyn KeyValueStore>>,
    durable_store: Option<Arc<dyn KeyValueStore>>,
    memory_store: Option<Arc<dyn KeyValueStore>>,
    credential_store_scope: CredentialStoreScope,
    clock: Option<Arc<dyn Clock>>,
    event_buffer: Option<usize>,
}

impl CoreConfigBuilder {
    /// Set the application namespace. Required, non-empty.
    pub fn app_key(mut self, app_key: impl Into<String>) -> Self {
        self.app_key = Some(app_key.into());
        self
    }

    /// Set the HTTP client bridge. Required.
    pub fn http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Set the navigator bridge. Required.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Set the session-scoped store. Required.
    pub fn session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Set the durable store. Required for `CredentialStoreScope::Durable`.
    pub fn durable_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.durable_store = Some(store);
        self
    }

    /// Set the in-memory store. Required for `CredentialStoreScope::InMemory`.
    pub fn memory_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.memory_store = Some(store);
        self
    }

    /// Select where the credential blob is persisted.
    pub fn credential_store_scope(mut self, scope: CredentialStoreScope) -> Self {
        self.credential_store_scope = scope;
        self
    }

    /// Override the time source (tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the event bus buffer capacity.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty `app_key` and
    /// [`Error::CapabilityMissing`] for each absent required bridge, with an
    /// actionable message naming the capability.
    pub fn build(self) -> Result<CoreConfig> {
        let app_key = self
            .app_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::Config(
                    "app_key is required. Provide the application namespace used to \
                     scope storage keys and encryption key derivation."
                        .to_string(),
                )
            })?;

        let http_client = self.http_client.ok_or_else(|| Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "No HTTP client implementation provided. \
                      Desktop: use bridge_desktop::ReqwestHttpClient."
                .to_string(),
        })?;

        let navigator = self.navigator.ok_or_else(|| Error::CapabilityMissing {
            capability: "Navigator".to_string(),
            message: "No navigator implementation provided. \
                      Desktop: use bridge_desktop::SystemNavigator."
                .to_string(),
        })?;

        let session_store = self.session_store.ok_or_else(|| Error::CapabilityMissing {
            capability: "KeyValueStore (session)".to_string(),
            message: "No session-scoped store provided. It holds PKCE transaction \
                      state and callback markers. Desktop: use \
                      bridge_desktop::MemoryKeyValueStore."
                .to_string(),
        })?;

        match self.credential_store_scope {
            CredentialStoreScope::Durable if self.durable_store.is_none() => {
                return Err(Error::CapabilityMissing {
                    capability: "KeyValueStore (durable)".to_string(),
                    message: "Credential store scope is Durable but no durable store \
                              was provided. Desktop: use \
                              bridge_desktop::SqliteKeyValueStore."
                        .to_string(),
                });
            }
            CredentialStoreScope::InMemory if self.memory_store.is_none() => {
                return Err(Error::CapabilityMissing {
                    capability: "KeyValueStore (memory)".to_string(),
                    message: "Credential store scope is InMemory but no in-memory \
                              store was provided. Desktop: use \
                              bridge_desktop::MemoryKeyValueStore."
                        .to_string(),
                });
            }
            _ => {}
        }

        Ok(CoreConfig {
            app_key,
            http_client,
            navigator,
            session_store,
            durable_store: self.durable_store,
            memory_store: self.memory_store,
            credential_store_scope: self.credential_store_scope,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer: self.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct StubHttpClient;

    #[async_trait]
    impl HttpClient for StubHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(bridge_traits::BridgeError::NotAvailable(
                "stub".to_string(),
            ))
        }
    }

    struct StubNavigator;

    impl Navigator for StubNavigator {
        fn navigate(&self, _url: &str) -> BridgeResult<()> {
            Ok(())
        }

        fn replace_url(&self, _url: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct StubStore {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                entries: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for StubStore {
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

    fn full_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .app_key("workbench")
            .http_client(Arc::new(StubHttpClient))
            .navigator(Arc::new(StubNavigator))
            .session_store(Arc::new(StubStore::new()))
            .durable_store(Arc::new(StubStore::new()))
    }

    #[test]
    fn test_build_with_all_capabilities() {
        let config = full_builder().build().unwrap();
        assert_eq!(config.app_key, "workbench");
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_missing_app_key_fails() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(StubHttpClient))
            .navigator(Arc::new(StubNavigator))
            .session_store(Arc::new(StubStore::new()))
            .durable_store(Arc::new(StubStore::new()))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_blank_app_key_fails() {
        let result = full_builder().app_key("   ").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_http_client_fails() {
        let result = CoreConfig::builder()
            .app_key("workbench")
            .navigator(Arc::new(StubNavigator))
            .session_store(Arc::new(StubStore::new()))
            .durable_store(Arc::new(StubStore::new()))
            .build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "HttpClient");
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_durable_scope_requires_durable_store() {
        let result = CoreConfig::builder()
            .app_key("workbench")
            .http_client(Arc::new(StubHttpClient))
            .navigator(Arc::new(StubNavigator))
            .session_store(Arc::new(StubStore::new()))
            .credential_store_scope(CredentialStoreScope::Durable)
            .build();
        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }

    #[test]
    fn test_session_scope_reuses_session_store() {
        let config = CoreConfig::builder()
            .app_key("workbench")
            .http_client(Arc::new(StubHttpClient))
            .navigator(Arc::new(StubNavigator))
            .session_store(Arc::new(StubStore::new()))
            .credential_store_scope(CredentialStoreScope::SessionScoped)
            .build()
            .unwrap();
        // No durable store needed for a session-scoped credential.
        assert!(config.durable_store.is_none());
        let _ = config.credential_store();
    }

    #[test]
    fn test_memory_scope_requires_memory_store() {
        let result = CoreConfig::builder()
            .app_key("workbench")
            .http_client(Arc::new(StubHttpClient))
            .navigator(Arc::new(StubNavigator))
            .session_store(Arc::new(StubStore::new()))
            .credential_store_scope(CredentialStoreScope::InMemory)
            .build();
        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }
}
