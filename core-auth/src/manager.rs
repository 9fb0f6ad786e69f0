//! Authentication orchestration facade.
//!
//! The [`AuthManager`] owns the provider registry and delegates credential
//! custody to the [`TokenManager`]. It drives the interactive flows
//! (login, callback handling, logout), the refresh path the token manager
//! calls back into, the per-user encryption key publication, and the
//! session-expired escalation to the UI shell.
//!
//! `is_authenticated`/`current_user` are a read-only projection of token
//! manager state plus the active provider; the invariant is that an
//! authenticated session always has a valid access token or a refresh in
//! flight.

use async_trait::async_trait;
use bridge_traits::kv::KeyValueStore;
use bridge_traits::navigation::Navigator;
use bridge_traits::time::Clock;
use core_async::time::Duration;
use core_async::timer::schedule;
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock, Weak};
use tracing::{debug, error, info, instrument, warn};

use crate::cipher::TokenCipher;
use crate::error::{AuthError, Result};
use crate::key_derivation::{derive_encryption_key, EncryptionKeyConsumer};
use crate::provider::{AuthProvider, ProviderInfo};
use crate::token_manager::{RefreshHandler, SessionExpiredHandler, TokenManager};
use crate::types::{AuthenticatedSession, CallbackRequest, LoginFlow, UserInfo};

/// How long a processed-callback marker lives. Long enough to absorb
/// re-entrant double delivery, short enough not to block a genuine retry.
const CALLBACK_MARKER_TTL: Duration = Duration::from_millis(100);

#[derive(Default, Clone)]
struct SessionSnapshot {
    is_authenticated: bool,
    current_user: Option<UserInfo>,
}

struct ManagerInner {
    app_key: String,
    providers: StdRwLock<HashMap<String, Arc<dyn AuthProvider>>>,
    active_provider: StdRwLock<Option<String>>,
    token_manager: TokenManager,
    session: StdRwLock<SessionSnapshot>,
    key_consumer: StdRwLock<Option<Arc<dyn EncryptionKeyConsumer>>>,
    session_store: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

/// Orchestrates provider selection, login/callback/logout/refresh flows,
/// and the encryption key bridge to the host shell.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<ManagerInner>,
}

impl AuthManager {
    /// Build the manager from a validated core configuration and wire the
    /// token manager's refresh and expiry callbacks back into it.
    pub fn new(config: &CoreConfig) -> Result<Self> {
        let cipher = TokenCipher::new(&config.app_key)?;
        let events = EventBus::new(config.event_buffer);

        let token_manager = TokenManager::new(
            config.credential_store(),
            cipher,
            config.clock.clone(),
            events.clone(),
            &config.app_key,
        );

        let inner = Arc::new(ManagerInner {
            app_key: config.app_key.clone(),
            providers: StdRwLock::new(HashMap::new()),
            active_provider: StdRwLock::new(None),
            token_manager,
            session: StdRwLock::new(SessionSnapshot::default()),
            key_consumer: StdRwLock::new(None),
            session_store: config.session_store.clone(),
            navigator: config.navigator.clone(),
            clock: config.clock.clone(),
            events,
        });

        inner
            .token_manager
            .set_refresh_handler(Arc::new(ManagerRefreshHandler {
                inner: Arc::downgrade(&inner),
            }));
        inner
            .token_manager
            .set_session_expired_handler(Arc::new(ManagerExpiryHandler {
                inner: Arc::downgrade(&inner),
            }));

        Ok(Self { inner })
    }

    /// The event bus carrying auth state changes. The UI shell subscribes
    /// here for sign-in/expiry notifications.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Register the external consumer of the derived encryption key.
    pub fn set_key_consumer(&self, consumer: Arc<dyn EncryptionKeyConsumer>) {
        *self
            .inner
            .key_consumer
            .write()
            .expect("consumer lock poisoned") = Some(consumer);
    }

    /// Load persisted credentials and restore authenticated state after a
    /// process restart. Must run before the interactive operations.
    pub async fn initialize(&self) -> Result<()> {
        self.inner.token_manager.initialize().await?;

        if self.inner.token_manager.access_token().await.is_some() {
            let user = self.inner.token_manager.user_info().await;
            {
                let mut session = self.inner.session.write().expect("session lock poisoned");
                session.is_authenticated = true;
                session.current_user = user.clone();
            }
            if let Some(user) = user {
                info!(provider = %user.provider, "Authenticated state restored");
                self.derive_and_publish_key(&user);
            }
        }

        Ok(())
    }

    /// Whether a user is currently authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .session
            .read()
            .expect("session lock poisoned")
            .is_authenticated
    }

    /// The authenticated user's profile, if any.
    pub fn current_user(&self) -> Option<UserInfo> {
        self.inner
            .session
            .read()
            .expect("session lock poisoned")
            .current_user
            .clone()
    }

    /// The valid access token, if one is held.
    pub async fn access_token(&self) -> Option<String> {
        self.inner.token_manager.access_token().await
    }

    /// Register an identity provider under its id.
    pub fn register_provider(&self, provider: Arc<dyn AuthProvider>) -> Result<()> {
        let id = provider.id().to_string();
        if id.trim().is_empty() {
            return Err(AuthError::Configuration {
                provider: "<unnamed>".to_string(),
                reason: "provider id must not be empty".to_string(),
            });
        }

        debug!(provider = %id, "Registered provider");
        self.inner
            .providers
            .write()
            .expect("providers lock poisoned")
            .insert(id, provider);
        Ok(())
    }

    /// Providers currently available for login, sorted by id.
    pub fn available_providers(&self) -> Vec<ProviderInfo> {
        let providers = self.inner.providers.read().expect("providers lock poisoned");
        let mut infos: Vec<ProviderInfo> = providers
            .values()
            .map(|p| ProviderInfo {
                id: p.id().to_string(),
                display_name: p.display_name().to_string(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Initialize every registered provider, evicting any that fail.
    ///
    /// A provider whose `initialize()` errors is removed from the registry,
    /// never left half-initialized, and the failure is logged without being
    /// fatal to the rest. Afterwards, the active provider is restored from
    /// the persisted profile when a session survived a restart.
    pub async fn initialize_providers(&self) {
        let providers: Vec<(String, Arc<dyn AuthProvider>)> = {
            let registry = self.inner.providers.read().expect("providers lock poisoned");
            registry
                .iter()
                .map(|(id, p)| (id.clone(), p.clone()))
                .collect()
        };

        let mut evicted = Vec::new();
        for (id, provider) in providers {
            match provider.initialize().await {
                Ok(()) => debug!(provider = %id, "Provider initialized"),
                Err(e) => {
                    warn!(provider = %id, error = %e, "Provider failed to initialize; evicting");
                    evicted.push(id);
                }
            }
        }

        if !evicted.is_empty() {
            let mut registry = self.inner.providers.write().expect("providers lock poisoned");
            for id in &evicted {
                registry.remove(id);
            }
        }

        let remaining = self
            .inner
            .providers
            .read()
            .expect("providers lock poisoned")
            .len();
        if remaining == 0 {
            warn!("No providers available after initialization");
            return;
        }

        self.restore_active_provider();
    }

    /// Re-link the active provider from the restored profile after a
    /// restart, when possible.
    fn restore_active_provider(&self) {
        let session = self
            .inner
            .session
            .read()
            .expect("session lock poisoned")
            .clone();
        if !session.is_authenticated {
            return;
        }

        let mut active = self
            .inner
            .active_provider
            .write()
            .expect("active lock poisoned");
        if active.is_some() {
            return;
        }

        if let Some(user) = session.current_user {
            let registry = self.inner.providers.read().expect("providers lock poisoned");
            if registry.contains_key(&user.provider) {
                debug!(provider = %user.provider, "Active provider restored");
                *active = Some(user.provider);
            } else {
                warn!(
                    provider = %user.provider,
                    "Cannot restore active provider: provider not registered"
                );
            }
        }
    }

    /// Begin an interactive login with the given provider.
    ///
    /// An unknown id is an error value, not a panic. A
    /// [`LoginFlow::Redirected`] result passes through untouched: the
    /// navigation is already in flight and nothing more will resolve here.
    /// A completed flow commits tokens, marks the provider active, and
    /// publishes the derived encryption key.
    #[instrument(skip(self))]
    pub async fn login(&self, provider_id: &str) -> Result<LoginFlow> {
        self.inner.token_manager.initialize().await?;

        let provider = self.provider_by_id(provider_id)?;

        info!("Starting login");
        let _ = self.inner.events.emit(CoreEvent::Auth(AuthEvent::SigningIn {
            provider: provider_id.to_string(),
        }));

        match provider.login().await {
            Ok(LoginFlow::Redirected { authorize_url }) => {
                debug!("Login redirect in flight");
                Ok(LoginFlow::Redirected { authorize_url })
            }
            Ok(LoginFlow::Completed(session)) => {
                self.commit_session(provider_id, &session).await?;
                debug!("Login completed");
                Ok(LoginFlow::Completed(session))
            }
            Err(e) => {
                let _ = self.inner.events.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: true,
                }));
                Err(e)
            }
        }
    }

    /// Process a captured OAuth redirect.
    ///
    /// The owning provider is selected via `can_handle_callback`. Repeated
    /// delivery of the same query string is rejected through a short-lived
    /// idempotency marker, so a single-use authorization code is never
    /// exchanged twice. On success the OAuth query parameters are scrubbed
    /// from the visible URL.
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn handle_callback(&self, request: &CallbackRequest) -> Result<AuthenticatedSession> {
        self.inner.token_manager.initialize().await?;

        let provider = self
            .find_provider_for_callback(&request.path)
            .ok_or_else(|| {
                warn!("No provider can handle this callback");
                AuthError::NoProviderForCallback
            })?;

        let marker_key = format!(
            "{}:callback_processed:{}:{}",
            self.inner.app_key,
            provider.id(),
            request.raw_query()
        );

        // Claim the marker before the exchange: a re-entrant second delivery
        // must be rejected, not allowed to replay the single-use code.
        let already_processed = self
            .inner
            .session_store
            .has(&marker_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        if already_processed {
            warn!(provider = %provider.id(), "Callback already processed; skipping");
            return Err(AuthError::CallbackAlreadyProcessed);
        }
        self.inner
            .session_store
            .set(&marker_key, b"1")
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        match provider.handle_callback(request).await {
            Ok(session) => {
                self.commit_session(provider.id(), &session).await?;

                // Scrub code/state from the visible URL.
                if let Err(e) = self.inner.navigator.replace_url("/") {
                    warn!(error = %e, "Failed to scrub callback URL");
                }

                // The marker only needs to survive re-entrant delivery.
                let store = self.inner.session_store.clone();
                let key = marker_key.clone();
                schedule(CALLBACK_MARKER_TTL, async move {
                    let _ = store.delete(&key).await;
                });

                info!(provider = %provider.id(), "Callback authentication successful");
                Ok(session)
            }
            Err(e) => {
                // A failed exchange may be retried; release the claim.
                let _ = self.inner.session_store.delete(&marker_key).await;
                let _ = self.inner.events.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: false,
                }));
                Err(e)
            }
        }
    }

    /// Refresh the access token through the active provider.
    ///
    /// Requires an active provider and a stored refresh token; both absences
    /// are explicit failures. Success re-persists tokens and re-derives the
    /// encryption key (a deterministic no-op for the same user, recomputed
    /// defensively). Failure tears down all authenticated state.
    #[instrument(skip(self))]
    pub async fn refresh_token(&self) -> Result<String> {
        self.inner.token_manager.initialize().await?;

        let provider_id = self
            .inner
            .active_provider
            .read()
            .expect("active lock poisoned")
            .clone()
            .ok_or(AuthError::NoActiveProvider)?;
        let provider = self
            .provider_by_id(&provider_id)
            .map_err(|_| AuthError::NoActiveProvider)?;

        let refresh_token = self
            .inner
            .token_manager
            .refresh_token()
            .await
            .ok_or(AuthError::NoRefreshToken)?;

        debug!(provider = %provider_id, "Refreshing token");

        match provider.refresh(&refresh_token).await {
            Ok(tokens) if tokens.expires_in > 0 => {
                let user = self.current_user();
                // Providers that do not rotate the refresh token keep the
                // presented one.
                let kept_refresh = tokens.refresh_token.clone().or(Some(refresh_token));

                self.inner
                    .token_manager
                    .set_tokens(
                        tokens.access_token.clone(),
                        kept_refresh,
                        tokens.expires_in,
                        user.clone(),
                    )
                    .await?;

                if let Some(user) = &user {
                    self.derive_and_publish_key(user);
                }

                let expires_at = (self.inner.clock.now()
                    + chrono::Duration::seconds(tokens.expires_in))
                .timestamp();
                let _ = self
                    .inner
                    .events
                    .emit(CoreEvent::Auth(AuthEvent::TokenRefreshed { expires_at }));

                debug!(provider = %provider_id, "Token refresh successful");
                Ok(tokens.access_token)
            }
            Ok(_) => {
                warn!("Refresh response carried no token lifetime");
                self.teardown_authenticated_state().await;
                Err(AuthError::RefreshFailed(
                    "No tokens returned by provider".to_string(),
                ))
            }
            Err(e) => {
                error!(error = %e, "Token refresh failed");
                self.teardown_authenticated_state().await;
                let _ = self.inner.events.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: e.to_string(),
                    recoverable: true,
                }));
                Err(e)
            }
        }
    }

    /// Sign out.
    ///
    /// Local teardown always happens: credential wiped, session anonymous,
    /// encryption key cleared. Provider-side logout runs afterwards and is
    /// best-effort; its failure is logged, never blocking.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.inner.token_manager.initialize().await?;

        debug!("Starting logout");

        if let Err(e) = self.inner.token_manager.clear().await {
            warn!(error = %e, "Failed to wipe persisted credential during logout");
        }

        let previous = self
            .inner
            .active_provider
            .write()
            .expect("active lock poisoned")
            .take();
        {
            let mut session = self.inner.session.write().expect("session lock poisoned");
            session.is_authenticated = false;
            session.current_user = None;
        }
        self.clear_published_key();

        let _ = self.inner.events.emit(CoreEvent::Auth(AuthEvent::SignedOut {
            provider: previous.clone(),
        }));

        if let Some(provider_id) = previous {
            if let Ok(provider) = self.provider_by_id(&provider_id) {
                if let Err(e) = provider.logout().await {
                    warn!(provider = %provider_id, error = %e, "Provider logout failed");
                }
            }
        }

        debug!("Logout completed");
        Ok(())
    }

    /// Terminal session expiry, driven by the token manager. The sole path
    /// from authenticated to anonymous without an explicit logout.
    async fn on_session_expired(&self, message: &str) {
        warn!(message, "Session expired; user must re-authenticate");

        {
            let mut session = self.inner.session.write().expect("session lock poisoned");
            session.is_authenticated = false;
            session.current_user = None;
        }
        *self
            .inner
            .active_provider
            .write()
            .expect("active lock poisoned") = None;
        self.clear_published_key();
    }

    /// Commit a successful authentication: persist tokens, mark the
    /// provider active, project the session state, publish the key.
    async fn commit_session(
        &self,
        provider_id: &str,
        session: &AuthenticatedSession,
    ) -> Result<()> {
        if session.tokens.expires_in <= 0 {
            // A provider that omits the token lifetime granted no usable
            // session; fail closed instead of holding a token that can
            // never be validated against an expiry.
            warn!(provider = %provider_id, "Provider returned tokens without a lifetime");
            self.inner.token_manager.clear().await?;
            return Err(AuthError::AuthenticationFailed {
                provider: provider_id.to_string(),
                reason: "provider returned tokens without a lifetime".to_string(),
            });
        }

        self.inner
            .token_manager
            .set_tokens(
                session.tokens.access_token.clone(),
                session.tokens.refresh_token.clone(),
                session.tokens.expires_in,
                Some(session.user.clone()),
            )
            .await?;

        *self
            .inner
            .active_provider
            .write()
            .expect("active lock poisoned") = Some(provider_id.to_string());
        {
            let mut snapshot = self.inner.session.write().expect("session lock poisoned");
            snapshot.is_authenticated = true;
            snapshot.current_user = Some(session.user.clone());
        }

        self.derive_and_publish_key(&session.user);

        let _ = self.inner.events.emit(CoreEvent::Auth(AuthEvent::SignedIn {
            subject: session.user.sub.clone(),
            provider: provider_id.to_string(),
        }));

        Ok(())
    }

    /// Fail-closed teardown after a refresh failure.
    async fn teardown_authenticated_state(&self) {
        {
            let mut session = self.inner.session.write().expect("session lock poisoned");
            session.is_authenticated = false;
            session.current_user = None;
        }
        self.clear_published_key();
        if let Err(e) = self.inner.token_manager.clear().await {
            warn!(error = %e, "Failed to wipe credential during teardown");
        }
    }

    fn derive_and_publish_key(&self, user: &UserInfo) {
        match derive_encryption_key(&self.inner.app_key, user) {
            Ok(key) => {
                let consumer = self
                    .inner
                    .key_consumer
                    .read()
                    .expect("consumer lock poisoned")
                    .clone();
                match consumer {
                    Some(consumer) => {
                        consumer.set_key(key);
                        debug!("Encryption key derived and published");
                    }
                    None => warn!("No key consumer registered; encryption key not published"),
                }
            }
            // Login proceeds without a published key; encrypted stores
            // stay locked rather than falling back to plaintext.
            Err(e) => error!(error = %e, "Failed to derive encryption key"),
        }
    }

    fn clear_published_key(&self) {
        let consumer = self
            .inner
            .key_consumer
            .read()
            .expect("consumer lock poisoned")
            .clone();
        if let Some(consumer) = consumer {
            consumer.clear_key();
            debug!("Encryption key cleared");
        }
    }

    fn provider_by_id(&self, provider_id: &str) -> Result<Arc<dyn AuthProvider>> {
        self.inner
            .providers
            .read()
            .expect("providers lock poisoned")
            .get(provider_id)
            .cloned()
            .ok_or_else(|| AuthError::UnknownProvider(provider_id.to_string()))
    }

    fn find_provider_for_callback(&self, path: &str) -> Option<Arc<dyn AuthProvider>> {
        self.inner
            .providers
            .read()
            .expect("providers lock poisoned")
            .values()
            .find(|p| p.can_handle_callback(path))
            .cloned()
    }
}

struct ManagerRefreshHandler {
    inner: Weak<ManagerInner>,
}

#[async_trait]
impl RefreshHandler for ManagerRefreshHandler {
    async fn refresh(&self) -> Result<()> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(AuthError::RefreshFailed(
                "auth manager dropped".to_string(),
            ));
        };
        AuthManager { inner }.refresh_token().await.map(|_| ())
    }
}

struct ManagerExpiryHandler {
    inner: Weak<ManagerInner>,
}

#[async_trait]
impl SessionExpiredHandler for ManagerExpiryHandler {
    async fn session_expired(&self, message: &str) {
        if let Some(inner) = self.inner.upgrade() {
            AuthManager { inner }.on_session_expired(message).await;
        }
    }
}
