//! Token lifecycle management.
//!
//! The token manager is the sole owner of the [`Credential`]: it loads the
//! encrypted blob at startup, persists every change, schedules proactive
//! refresh ahead of expiry, drives the bounded retry chain when refresh
//! fails, and escalates terminal session expiry.
//!
//! # Lifecycle
//!
//! ```text
//! uninitialized -> ready(no credential) -> ready(valid) -> refreshing
//!                                              ^              |
//!                                              +---- ok ------+
//!                                                    |
//!                                              expired(terminal)
//! ```
//!
//! Every public operation awaits the readiness gate before touching shared
//! state, so nothing can race the asynchronous load from storage. The
//! refresh-retry chain is strictly sequential: each failure schedules exactly
//! one next attempt, and `set_tokens`/`clear` cancel whatever is pending
//! before state moves on.

use async_trait::async_trait;
use bridge_traits::kv::KeyValueStore;
use bridge_traits::time::Clock;
use chrono::Duration as ChronoDuration;
use core_async::time::Duration;
use core_async::timer::{schedule, ScheduledTask};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, error, info, warn};

use crate::cipher::TokenCipher;
use crate::error::{AuthError, Result};
use crate::types::{Credential, UserInfo};

/// Lead time before expiry at which a proactive refresh is scheduled.
const REFRESH_LEAD_SECS: i64 = 300;

/// Consecutive refresh failures tolerated before the session is declared
/// expired.
const MAX_REFRESH_RETRIES: u32 = 3;

/// Message delivered with the terminal session-expiry escalation.
const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please sign in again.";

/// Drives an actual refresh when the manager decides one is due.
///
/// Installed by the auth manager; the implementation performs the
/// provider exchange and feeds the result back through
/// [`TokenManager::set_tokens`].
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// Notified exactly once when refresh retries are exhausted.
#[async_trait]
pub trait SessionExpiredHandler: Send + Sync {
    async fn session_expired(&self, message: &str);
}

struct TokenState {
    credential: Option<Credential>,
    refresh_attempts: u32,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    cipher: TokenCipher,
    clock: Arc<dyn Clock>,
    events: EventBus,
    storage_key: String,
    state: RwLock<TokenState>,
    refresh_timer: Mutex<Option<ScheduledTask>>,
    refresh_handler: StdRwLock<Option<Arc<dyn RefreshHandler>>>,
    session_expired_handler: StdRwLock<Option<Arc<dyn SessionExpiredHandler>>>,
    ready: OnceCell<()>,
}

/// Owner of the credential and its refresh schedule.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        cipher: TokenCipher,
        clock: Arc<dyn Clock>,
        events: EventBus,
        app_key: &str,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cipher,
                clock,
                events,
                storage_key: format!("{}:credential", app_key),
                state: RwLock::new(TokenState {
                    credential: None,
                    refresh_attempts: 0,
                }),
                refresh_timer: Mutex::new(None),
                refresh_handler: StdRwLock::new(None),
                session_expired_handler: StdRwLock::new(None),
                ready: OnceCell::new(),
            }),
        }
    }

    /// Install the refresh driver. Must happen before the first refresh is
    /// due; the auth manager does it at construction time.
    pub fn set_refresh_handler(&self, handler: Arc<dyn RefreshHandler>) {
        *self.inner.refresh_handler.write().expect("handler lock poisoned") = Some(handler);
    }

    /// Install the terminal-expiry listener.
    pub fn set_session_expired_handler(&self, handler: Arc<dyn SessionExpiredHandler>) {
        *self
            .inner
            .session_expired_handler
            .write()
            .expect("handler lock poisoned") = Some(handler);
    }

    /// Load the persisted credential and arm auto-refresh.
    ///
    /// Idempotent: concurrent and repeated callers share one load. Every
    /// other public operation awaits the same gate, so none of them can
    /// observe half-initialized state.
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_ready().await
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.inner
            .ready
            .get_or_try_init(|| self.load_from_storage())
            .await?;
        Ok(())
    }

    async fn load_from_storage(&self) -> Result<()> {
        let inner = &self.inner;

        let blob = inner
            .store
            .get(&inner.storage_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        let Some(blob) = blob else {
            debug!("No persisted credential");
            return Ok(());
        };

        let credential = match self.decode_blob(&blob) {
            Ok(credential) => credential,
            Err(e) => {
                // Undecryptable or corrupted blob means "no valid session".
                warn!(error = %e, "Discarding unreadable persisted credential");
                if let Err(delete_err) = inner.store.delete(&inner.storage_key).await {
                    warn!(error = %delete_err, "Failed to delete unreadable credential");
                }
                return Ok(());
            }
        };

        let now = inner.clock.now();
        if credential.is_expired(now) {
            if credential.refresh_token.is_some() {
                // Access token is stale but the refresh token and profile are
                // kept for one immediate refresh attempt.
                info!("Persisted access token expired; attempting refresh");
                inner.state.write().await.credential = Some(credential);
                self.arm_timer(Duration::ZERO).await;
            } else {
                info!("Persisted credential expired with no refresh token; discarding");
                if let Err(e) = inner.store.delete(&inner.storage_key).await {
                    warn!(error = %e, "Failed to delete expired credential");
                }
            }
            return Ok(());
        }

        debug!(expiry = %credential.expiry, "Restored persisted credential");
        inner.state.write().await.credential = Some(credential);
        self.schedule_auto_refresh().await;
        Ok(())
    }

    fn decode_blob(&self, blob: &[u8]) -> Result<Credential> {
        let plaintext = self.inner.cipher.decrypt(blob)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| AuthError::Serialization(format!("credential blob: {}", e)))
    }

    /// Store a fresh token set.
    ///
    /// `expires_in <= 0` means the provider granted no usable session and
    /// clears all state instead. Otherwise the credential is persisted
    /// encrypted, the retry counter resets, and auto-refresh is rescheduled.
    pub async fn set_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        user_info: Option<UserInfo>,
    ) -> Result<()> {
        self.ensure_ready().await?;

        if expires_in <= 0 {
            warn!("Provider reported no token lifetime; clearing session state");
            return self.clear().await;
        }

        let now = self.inner.clock.now();
        let credential = Credential {
            access_token,
            refresh_token,
            expiry: now + ChronoDuration::seconds(expires_in),
            user_info,
        };

        self.persist(&credential).await?;

        {
            let mut state = self.inner.state.write().await;
            state.credential = Some(credential);
            state.refresh_attempts = 0;
        }

        self.schedule_auto_refresh().await;
        Ok(())
    }

    async fn persist(&self, credential: &Credential) -> Result<()> {
        let plaintext = serde_json::to_vec(credential)
            .map_err(|e| AuthError::Serialization(format!("credential blob: {}", e)))?;
        let blob = self.inner.cipher.encrypt(&plaintext)?;
        self.inner
            .store
            .set(&self.inner.storage_key, &blob)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        debug!(
            has_refresh_token = credential.refresh_token.is_some(),
            "Credential persisted"
        );
        Ok(())
    }

    /// The access token, while it is still valid. Never returns a stale
    /// token: at or after expiry this is `None`.
    pub async fn access_token(&self) -> Option<String> {
        self.ensure_ready().await.ok()?;
        let state = self.inner.state.read().await;
        let credential = state.credential.as_ref()?;
        if credential.is_expired(self.inner.clock.now()) {
            return None;
        }
        Some(credential.access_token.clone())
    }

    /// The refresh token, if one is held (returned even when the access
    /// token has already expired, for the refresh path).
    pub async fn refresh_token(&self) -> Option<String> {
        self.ensure_ready().await.ok()?;
        self.inner
            .state
            .read()
            .await
            .credential
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
    }

    /// Profile stored with the credential.
    pub async fn user_info(&self) -> Option<UserInfo> {
        self.ensure_ready().await.ok()?;
        self.inner
            .state
            .read()
            .await
            .credential
            .as_ref()
            .and_then(|c| c.user_info.clone())
    }

    /// Whether a non-expired access token is currently held.
    pub async fn is_token_valid(&self) -> bool {
        self.access_token().await.is_some()
    }

    /// Cancel any pending refresh and wipe the credential, in memory and in
    /// storage.
    pub async fn clear(&self) -> Result<()> {
        // Deliberately no ensure_ready: clearing must work even when the
        // initial load cannot complete.
        self.cancel_pending_timer().await;

        {
            let mut state = self.inner.state.write().await;
            state.credential = None;
        }

        self.inner
            .store
            .delete(&self.inner.storage_key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        debug!("Credential cleared");
        Ok(())
    }

    async fn cancel_pending_timer(&self) {
        let mut slot = self.inner.refresh_timer.lock().await;
        if let Some(timer) = slot.take() {
            timer.cancel();
        }
    }

    /// Recompute the refresh schedule from the current credential.
    ///
    /// - more than the lead time remaining: timer at `expiry - lead`
    /// - inside the lead window: refresh immediately
    /// - already expired with a refresh token: refresh immediately
    /// - already expired without one: terminal session expiry
    async fn schedule_auto_refresh(&self) {
        let (expiry, has_refresh_token) = {
            let state = self.inner.state.read().await;
            match state.credential.as_ref() {
                Some(c) => (c.expiry, c.refresh_token.is_some()),
                None => {
                    drop(state);
                    self.cancel_pending_timer().await;
                    return;
                }
            }
        };

        let remaining = expiry - self.inner.clock.now();
        let lead = ChronoDuration::seconds(REFRESH_LEAD_SECS);

        if remaining > lead {
            let delay = (remaining - lead).to_std().unwrap_or(Duration::ZERO);
            debug!(delay_secs = delay.as_secs(), "Auto-refresh scheduled");
            self.arm_timer(delay).await;
        } else if remaining > ChronoDuration::zero() {
            debug!("Token inside refresh lead window; refreshing now");
            self.arm_timer(Duration::ZERO).await;
        } else if has_refresh_token {
            debug!("Token already expired; attempting refresh now");
            self.arm_timer(Duration::ZERO).await;
        } else {
            self.escalate_session_expired().await;
        }
    }

    // Returns a boxed future rather than being a plain `async fn` so that the
    // self-referential refresh chain (run_refresh -> handle_refresh_failure ->
    // arm_timer -> schedule -> run_refresh) has a concrete `Send` type at each
    // await boundary. Without the type erasure the compiler cannot prove the
    // scheduled future is `Send`, which `schedule` (tokio::spawn) requires.
    fn arm_timer(&self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut slot = self.inner.refresh_timer.lock().await;
            if let Some(previous) = slot.take() {
                previous.cancel();
            }
            let manager = self.clone();
            let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
                manager.run_refresh().await;
            });
            *slot = Some(schedule(delay, task));
        })
    }

    /// One link of the sequential refresh chain.
    async fn run_refresh(&self) {
        // Drop this task's own handle from the slot before anything else:
        // rescheduling (retry) and escalation both clear the slot, and they
        // must not abort the very task that is executing them.
        {
            let mut slot = self.inner.refresh_timer.lock().await;
            slot.take();
        }

        let handler = self
            .inner
            .refresh_handler
            .read()
            .expect("handler lock poisoned")
            .clone();

        let _ = self
            .inner
            .events
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

        let outcome = match handler {
            Some(handler) => handler.refresh().await,
            None => Err(AuthError::RefreshFailed(
                "no refresh handler installed".to_string(),
            )),
        };

        match outcome {
            Ok(()) => {
                // The handler committed new tokens through set_tokens, which
                // reset the retry counter and rescheduled.
                debug!("Auto-refresh succeeded");
            }
            Err(e) => {
                warn!(error = %e, "Auto-refresh attempt failed");
                self.handle_refresh_failure().await;
            }
        }
    }

    async fn handle_refresh_failure(&self) {
        let attempts = {
            let mut state = self.inner.state.write().await;
            state.refresh_attempts += 1;
            state.refresh_attempts
        };

        if attempts >= MAX_REFRESH_RETRIES {
            error!(attempts, "Refresh retries exhausted; session is expired");
            self.escalate_session_expired().await;
            return;
        }

        // Exponential backoff: 2^attempt seconds (2s, 4s, ...). The chain is
        // sequential; each failure arms exactly one next attempt.
        let delay = Duration::from_secs(2u64.saturating_pow(attempts));
        warn!(
            attempt = attempts,
            delay_secs = delay.as_secs(),
            "Scheduling refresh retry"
        );
        self.arm_timer(delay).await;
    }

    /// Terminal transition: wipe everything and notify, exactly once per
    /// exhausted chain. No further refresh happens without a fresh login.
    async fn escalate_session_expired(&self) {
        self.cancel_pending_timer().await;

        {
            let mut state = self.inner.state.write().await;
            state.credential = None;
        }
        if let Err(e) = self.inner.store.delete(&self.inner.storage_key).await {
            warn!(error = %e, "Failed to delete credential during expiry");
        }

        let _ = self
            .inner
            .events
            .emit(CoreEvent::Auth(AuthEvent::SessionExpired {
                message: SESSION_EXPIRED_MESSAGE.to_string(),
                timestamp: self.inner.clock.now(),
            }));

        let handler = self
            .inner
            .session_expired_handler
            .read()
            .expect("handler lock poisoned")
            .clone();
        if let Some(handler) = handler {
            handler.session_expired(SESSION_EXPIRED_MESSAGE).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::tests_support::MemoryStore;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Settable clock for expiry arithmetic.
    struct MockClock {
        now: StdRwLock<DateTime<Utc>>,
    }

    impl MockClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: StdRwLock::new(Utc::now()),
            })
        }

        fn advance(&self, duration: ChronoDuration) {
            let mut now = self.now.write().unwrap();
            *now = *now + duration;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.read().unwrap()
        }
    }

    struct CountingRefreshHandler {
        calls: AtomicU32,
        succeed: bool,
    }

    impl CountingRefreshHandler {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                succeed,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshHandler for CountingRefreshHandler {
        async fn refresh(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(())
            } else {
                Err(AuthError::RefreshFailed("simulated".to_string()))
            }
        }
    }

    struct CountingExpiryHandler {
        calls: AtomicU32,
    }

    impl CountingExpiryHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionExpiredHandler for CountingExpiryHandler {
        async fn session_expired(&self, _message: &str) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        manager: TokenManager,
        store: Arc<MemoryStore>,
        clock: Arc<MockClock>,
        events: EventBus,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let clock = MockClock::new();
        let events = EventBus::new(64);
        let manager = TokenManager::new(
            store.clone(),
            TokenCipher::new("workbench").unwrap(),
            clock.clone(),
            events.clone(),
            "workbench",
        );
        Harness {
            manager,
            store,
            clock,
            events,
        }
    }

    fn user() -> UserInfo {
        UserInfo {
            sub: "user-1".to_string(),
            name: Some("Jane".to_string()),
            email: None,
            avatar: None,
            provider: "mock".to_string(),
        }
    }

    #[tokio::test]
    async fn test_access_token_valid_before_expiry() {
        let h = harness();
        h.manager.set_refresh_handler(CountingRefreshHandler::new(true));

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, Some(user()))
            .await
            .unwrap();

        assert_eq!(h.manager.access_token().await.as_deref(), Some("at-1"));
        assert!(h.manager.is_token_valid().await);

        // Still valid one second before expiry.
        h.clock.advance(ChronoDuration::seconds(3599));
        assert_eq!(h.manager.access_token().await.as_deref(), Some("at-1"));
    }

    #[tokio::test]
    async fn test_access_token_none_at_and_after_expiry() {
        let h = harness();
        h.manager.set_refresh_handler(CountingRefreshHandler::new(true));

        h.manager
            .set_tokens("at-1".to_string(), None, 3600, None)
            .await
            .unwrap();

        h.clock.advance(ChronoDuration::seconds(3600));
        assert!(h.manager.access_token().await.is_none());

        h.clock.advance(ChronoDuration::seconds(100));
        assert!(h.manager.access_token().await.is_none());
    }

    #[tokio::test]
    async fn test_zero_expires_in_clears_state() {
        let h = harness();
        h.manager.set_refresh_handler(CountingRefreshHandler::new(true));

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, Some(user()))
            .await
            .unwrap();
        assert!(h.manager.is_token_valid().await);

        h.manager
            .set_tokens("at-2".to_string(), Some("rt-2".to_string()), 0, Some(user()))
            .await
            .unwrap();

        assert!(h.manager.access_token().await.is_none());
        assert!(h.manager.refresh_token().await.is_none());
        assert!(h.store.get("workbench:credential").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_persistence() {
        let h = harness();
        h.manager.set_refresh_handler(CountingRefreshHandler::new(true));

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, Some(user()))
            .await
            .unwrap();

        // A second manager over the same store, cipher, and clock restores
        // an equivalent credential.
        let reloaded = TokenManager::new(
            h.store.clone(),
            TokenCipher::new("workbench").unwrap(),
            h.clock.clone(),
            EventBus::new(16),
            "workbench",
        );
        reloaded.set_refresh_handler(CountingRefreshHandler::new(true));
        reloaded.initialize().await.unwrap();

        assert_eq!(reloaded.access_token().await.as_deref(), Some("at-1"));
        assert_eq!(reloaded.refresh_token().await.as_deref(), Some("rt-1"));
        assert_eq!(reloaded.user_info().await, Some(user()));
    }

    #[tokio::test]
    async fn test_persisted_blob_is_not_plaintext() {
        let h = harness();
        h.manager
            .set_tokens("super-secret-token".to_string(), None, 3600, None)
            .await
            .unwrap();

        let blob = h.store.get("workbench:credential").await.unwrap().unwrap();
        let blob_text = String::from_utf8_lossy(&blob);
        assert!(!blob_text.contains("super-secret-token"));
    }

    #[tokio::test]
    async fn test_unreadable_blob_falls_back_to_clean_state() {
        let h = harness();
        h.store
            .set("workbench:credential", b"not-a-valid-ciphertext")
            .await
            .unwrap();

        h.manager.initialize().await.unwrap();

        assert!(h.manager.access_token().await.is_none());
        // The corrupted blob was deleted.
        assert!(h.store.get("workbench:credential").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_at_load_without_refresh_token_discards() {
        let h = harness();
        h.manager
            .set_tokens("at-1".to_string(), None, 3600, Some(user()))
            .await
            .unwrap();

        h.clock.advance(ChronoDuration::seconds(7200));

        let reloaded = TokenManager::new(
            h.store.clone(),
            TokenCipher::new("workbench").unwrap(),
            h.clock.clone(),
            EventBus::new(16),
            "workbench",
        );
        reloaded.initialize().await.unwrap();

        assert!(reloaded.access_token().await.is_none());
        assert!(reloaded.refresh_token().await.is_none());
        assert!(h.store.get("workbench:credential").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_at_load_with_refresh_token_attempts_refresh() {
        let h = harness();
        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, Some(user()))
            .await
            .unwrap();

        h.clock.advance(ChronoDuration::seconds(7200));

        let reloaded = TokenManager::new(
            h.store.clone(),
            TokenCipher::new("workbench").unwrap(),
            h.clock.clone(),
            EventBus::new(16),
            "workbench",
        );
        let refresh = CountingRefreshHandler::new(true);
        reloaded.set_refresh_handler(refresh.clone());
        reloaded.initialize().await.unwrap();

        // Profile survives for the refresh attempt.
        assert_eq!(reloaded.user_info().await, Some(user()));
        assert_eq!(reloaded.refresh_token().await.as_deref(), Some("rt-1"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(refresh.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_fires_at_lead_time() {
        let h = harness();
        let refresh = CountingRefreshHandler::new(true);
        h.manager.set_refresh_handler(refresh.clone());

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, None)
            .await
            .unwrap();

        // 5 minutes of lead on a 1-hour token: due at t+3300s.
        tokio::time::sleep(Duration::from_secs(3299)).await;
        assert_eq!(refresh.calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(refresh.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_within_lead_window_refreshes_immediately() {
        let h = harness();
        let refresh = CountingRefreshHandler::new(true);
        h.manager.set_refresh_handler(refresh.clone());

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 200, None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(refresh.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_pending_refresh() {
        let h = harness();
        let refresh = CountingRefreshHandler::new(true);
        h.manager.set_refresh_handler(refresh.clone());

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, None)
            .await
            .unwrap();
        h.manager.clear().await.unwrap();

        tokio::time::sleep(Duration::from_secs(4000)).await;
        assert_eq!(refresh.calls(), 0);
        assert!(h.store.get("workbench:credential").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_exhaustion_fires_session_expired_once() {
        let h = harness();
        let refresh = CountingRefreshHandler::new(false);
        let expired = CountingExpiryHandler::new();
        h.manager.set_refresh_handler(refresh.clone());
        h.manager.set_session_expired_handler(expired.clone());
        let mut events = h.events.subscribe();

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, None)
            .await
            .unwrap();

        // First attempt at t+3300s, retries after 2s and 4s, then terminal.
        tokio::time::sleep(Duration::from_secs(3300 + 2 + 4 + 10)).await;

        assert_eq!(refresh.calls(), 3);
        assert_eq!(expired.calls(), 1);
        assert!(h.manager.access_token().await.is_none());
        assert!(h.store.get("workbench:credential").await.unwrap().is_none());

        // No further retry is ever scheduled.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(refresh.calls(), 3);
        assert_eq!(expired.calls(), 1);

        // Exactly one SessionExpired event was emitted.
        let mut session_expired_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(
                event,
                CoreEvent::Auth(AuthEvent::SessionExpired { .. })
            ) {
                session_expired_events += 1;
            }
        }
        assert_eq!(session_expired_events, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_tokens_resets_retry_counter() {
        let h = harness();
        let refresh = CountingRefreshHandler::new(false);
        let expired = CountingExpiryHandler::new();
        h.manager.set_refresh_handler(refresh.clone());
        h.manager.set_session_expired_handler(expired.clone());

        h.manager
            .set_tokens("at-1".to_string(), Some("rt-1".to_string()), 3600, None)
            .await
            .unwrap();

        // Let two failures accumulate (t+3300 and the 2s retry).
        tokio::time::sleep(Duration::from_secs(3303)).await;
        assert_eq!(refresh.calls(), 2);
        assert_eq!(expired.calls(), 0);

        // A successful token update resets the chain before the third
        // failure becomes terminal.
        h.manager
            .set_tokens("at-2".to_string(), Some("rt-2".to_string()), 3600, None)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3301)).await;
        // The chain starts over: one fresh attempt, not a terminal third.
        assert_eq!(refresh.calls(), 3);
        assert_eq!(expired.calls(), 0);
    }
}
