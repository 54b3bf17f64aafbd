//! Token lifecycle: the authoritative session state and its refresh timer.
//!
//! `SessionManager` owns the `SessionState` and at most one pending refresh
//! task. Both live behind a single lock and are always changed together.
//! Every change of the pending timer bumps a generation counter; work that
//! suspends (boot-time validation, the refresh itself) remembers the
//! generation it started under and drops its result if the session moved
//! on in the meantime, so a logout can never be undone by a late refresh.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::claims::{self, Claims, TokenDecodeError};
use super::{AuthError, SessionStore};
use crate::api::AuthApi;
use crate::models::{Credentials, Principal, SessionState, TokenResponse};

/// Seconds before expiry at which the access token is refreshed.
pub const REFRESH_SKEW_SECS: i64 = 60;

pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

/// Handle to the session lifecycle.
/// Clone is cheap - all clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    store: SessionStore,
    skew_secs: i64,
    shared: Mutex<Shared>,
    listeners: Mutex<Listeners>,
}

struct Shared {
    state: SessionState,
    pending: Option<PendingRefresh>,
    generation: u64,
}

struct PendingRefresh {
    handle: JoinHandle<()>,
    due_at: DateTime<Utc>,
}

#[derive(Default)]
struct Listeners {
    next_id: SubscriptionId,
    entries: Vec<(SubscriptionId, Listener)>,
}

#[derive(Debug, PartialEq, Eq)]
enum RefreshOutcome {
    Refreshed,
    NoRefreshToken,
    Superseded,
}

impl SessionManager {
    pub fn new(api: Arc<dyn AuthApi>, store: SessionStore) -> Self {
        Self::with_refresh_skew(api, store, REFRESH_SKEW_SECS)
    }

    /// Starts `Initializing` when the store holds an access token, otherwise
    /// `Unauthenticated`. Call [`initialize`](Self::initialize) to resolve it.
    pub fn with_refresh_skew(api: Arc<dyn AuthApi>, store: SessionStore, skew_secs: i64) -> Self {
        let state = if store.has_access_token() {
            SessionState::Initializing
        } else {
            SessionState::Unauthenticated
        };
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                skew_secs,
                shared: Mutex::new(Shared {
                    state,
                    pending: None,
                    generation: 0,
                }),
                listeners: Mutex::new(Listeners::default()),
            }),
        }
    }

    /// Validate the persisted token with the server and resolve the
    /// boot-time state.
    pub async fn initialize(&self) -> SessionState {
        self.inner.initialize().await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        info!(email, "Logging in");
        let response = self.inner.api.login(email, password).await.map_err(|e| {
            warn!(email, error = %e, "Login failed");
            AuthError::from_api(e, "Login failed")
        })?;
        self.inner.establish(response).await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<Principal, AuthError> {
        info!(email, role, "Registering");
        let response = self
            .inner
            .api
            .register(email, password, role)
            .await
            .map_err(|e| {
                warn!(email, error = %e, "Registration failed");
                AuthError::from_api(e, "Registration failed")
            })?;
        self.inner.establish(response).await
    }

    /// End the session. Local invalidation always happens; telling the
    /// server is best effort.
    pub async fn logout(&self) {
        self.inner.logout().await;
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock_shared().state.clone()
    }

    pub fn user(&self) -> Option<Principal> {
        self.inner.lock_shared().state.user().cloned()
    }

    /// Bearer token for authenticated requests
    pub fn access_token(&self) -> Option<String> {
        self.inner
            .lock_shared()
            .state
            .credentials()
            .map(|c| c.access_token.clone())
    }

    pub fn has_pending_refresh(&self) -> bool {
        self.inner.lock_shared().pending.is_some()
    }

    /// When the pending refresh is due, if one is scheduled
    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_shared().pending.as_ref().map(|p| p.due_at)
    }

    /// Register a listener called with the new state after every transition.
    /// Listeners run on the thread that made the transition and must not
    /// block.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let mut listeners = self.inner.lock_listeners();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.lock_listeners();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() != before
    }
}

impl Inner {
    fn lock_shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Call listeners outside of any lock so they may read the manager.
    fn notify(&self, state: &SessionState) {
        let listeners: Vec<Listener> = self
            .lock_listeners()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(state);
        }
    }

    async fn initialize(self: &Arc<Self>) -> SessionState {
        let credentials = match self.store.get() {
            Ok(Some(credentials)) => credentials,
            Ok(None) => {
                debug!("No persisted session");
                return self.invalidate();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return self.invalidate();
            }
        };

        if !claims::is_well_formed(&credentials.access_token) {
            warn!("Persisted access token is malformed; discarding it");
            return self.invalidate();
        }

        let (generation, changed) = {
            let mut shared = self.lock_shared();
            Self::cancel_refresh(&mut shared);
            let changed = shared.state != SessionState::Initializing;
            shared.state = SessionState::Initializing;
            (shared.generation, changed)
        };
        if changed {
            self.notify(&SessionState::Initializing);
        }

        let result = self.api.me(&credentials.access_token).await;

        let state = {
            let mut shared = self.lock_shared();
            if shared.generation != generation {
                debug!("Session changed while validating persisted token");
                return shared.state.clone();
            }
            match result {
                Ok(user) => match self.commit(&mut shared, user, credentials) {
                    Ok(state) => {
                        info!("Restored persisted session");
                        state
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to persist restored session");
                        self.invalidate_locked(&mut shared);
                        SessionState::Unauthenticated
                    }
                },
                Err(e) => {
                    info!(error = %e, "Persisted session rejected; logging out locally");
                    self.invalidate_locked(&mut shared);
                    SessionState::Unauthenticated
                }
            }
        };
        self.notify(&state);
        state
    }

    /// Shared tail of login and register: persist, resolve the user, commit.
    async fn establish(self: &Arc<Self>, response: TokenResponse) -> Result<Principal, AuthError> {
        if !claims::is_well_formed(&response.access_token) {
            warn!("Server returned a malformed access token");
            return Err(TokenDecodeError::Malformed.into());
        }
        let credentials = Credentials::from(response);
        if let Err(e) = self.store.set(&credentials) {
            // A half-written pair must not be restored on the next start
            warn!(error = %e, "Failed to persist new session");
            self.invalidate();
            return Err(e.into());
        }

        let user = match self.api.me(&credentials.access_token).await {
            Ok(user) => user,
            Err(e) => {
                // Credentials without a user are not a session
                warn!(error = %e, "Could not resolve user for new session");
                self.invalidate();
                return Err(AuthError::Network(format!("Failed to get user info: {}", e)));
            }
        };

        let committed = {
            let mut shared = self.lock_shared();
            match self.commit(&mut shared, user.clone(), credentials) {
                Ok(state) => Ok(state),
                Err(e) => Err((e, self.invalidate_locked(&mut shared).1)),
            }
        };
        let state = match committed {
            Ok(state) => state,
            Err((e, changed)) => {
                warn!(error = %e, "Failed to persist new session");
                if changed {
                    self.notify(&SessionState::Unauthenticated);
                }
                return Err(e.into());
            }
        };
        info!(user_id = user.id, email = %user.email, "Session established");
        self.notify(&state);
        Ok(user)
    }

    async fn logout(self: &Arc<Self>) {
        let (refresh_token, changed) = {
            let mut shared = self.lock_shared();
            self.invalidate_locked(&mut shared)
        };
        if changed {
            info!("Logged out");
            self.notify(&SessionState::Unauthenticated);
        }
        self.notify_server_logout(refresh_token).await;
    }

    /// Local invalidation must not depend on the server being reachable
    async fn notify_server_logout(&self, refresh_token: Option<String>) {
        if let Some(refresh_token) = refresh_token {
            if let Err(e) = self.api.logout(&refresh_token).await {
                warn!(error = %e, "Logout notification failed; session already cleared locally");
            }
        }
    }

    /// Runs when the refresh timer fires.
    async fn perform_refresh(self: Arc<Self>, generation: u64) {
        {
            let mut shared = self.lock_shared();
            if shared.generation != generation {
                return;
            }
            // Detach: from here on a cancel must not abort this task
            // mid-request, the generation check guards the commit instead
            shared.pending = None;
        }

        match self.refresh_session(generation).await {
            Ok(RefreshOutcome::Refreshed) => info!("Access token refreshed"),
            Ok(RefreshOutcome::NoRefreshToken) => {
                debug!("No refresh token; session will lapse at expiry")
            }
            Ok(RefreshOutcome::Superseded) => debug!("Session changed during refresh"),
            Err(e) => {
                // Check and invalidate under one guard so a login that
                // commits in between is left alone
                let ended = {
                    let mut shared = self.lock_shared();
                    (shared.generation == generation).then(|| self.invalidate_locked(&mut shared))
                };
                let Some((refresh_token, changed)) = ended else {
                    debug!(error = %e, "Stale refresh failure ignored");
                    return;
                };
                warn!(error = %e, "Token refresh failed; ending session");
                if changed {
                    self.notify(&SessionState::Unauthenticated);
                }
                self.notify_server_logout(refresh_token).await;
            }
        }
    }

    async fn refresh_session(
        self: &Arc<Self>,
        generation: u64,
    ) -> Result<RefreshOutcome, AuthError> {
        let Some(refresh_token) = self.store.refresh_token()? else {
            return Ok(RefreshOutcome::NoRefreshToken);
        };

        let response = self
            .api
            .refresh(&refresh_token)
            .await
            .map_err(AuthError::from_refresh)?;
        if !claims::is_well_formed(&response.access_token) {
            return Err(TokenDecodeError::Malformed.into());
        }

        let state = {
            let mut shared = self.lock_shared();
            if shared.generation != generation {
                return Ok(RefreshOutcome::Superseded);
            }
            let SessionState::Authenticated { user, credentials } = &shared.state else {
                return Ok(RefreshOutcome::Superseded);
            };
            let (user, credentials) = (user.clone(), credentials.rotated(response));
            self.commit(&mut shared, user, credentials)?
        };
        self.notify(&state);
        Ok(RefreshOutcome::Refreshed)
    }

    /// Write through, move to `Authenticated` and re-arm the timer.
    fn commit(
        self: &Arc<Self>,
        shared: &mut Shared,
        user: Principal,
        credentials: Credentials,
    ) -> anyhow::Result<SessionState> {
        self.store.set(&credentials)?;
        Self::cancel_refresh(shared);
        self.arm_refresh(shared, &credentials.access_token);
        shared.state = SessionState::Authenticated { user, credentials };
        Ok(shared.state.clone())
    }

    /// Drop the session locally. Returns the state after the call.
    fn invalidate(&self) -> SessionState {
        let changed = {
            let mut shared = self.lock_shared();
            self.invalidate_locked(&mut shared).1
        };
        if changed {
            self.notify(&SessionState::Unauthenticated);
        }
        SessionState::Unauthenticated
    }

    /// Cancel the timer first, then clear the store and the state.
    /// Returns the refresh token that was in use and whether the state changed.
    fn invalidate_locked(&self, shared: &mut Shared) -> (Option<String>, bool) {
        Self::cancel_refresh(shared);

        let persisted = self.store.refresh_token().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read refresh token");
            None
        });
        let refresh_token = persisted.or_else(|| {
            shared
                .state
                .credentials()
                .and_then(|c| c.refresh_token.clone())
        });
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }

        let changed = shared.state != SessionState::Unauthenticated;
        shared.state = SessionState::Unauthenticated;
        (refresh_token, changed)
    }

    fn cancel_refresh(shared: &mut Shared) {
        shared.generation += 1;
        if let Some(pending) = shared.pending.take() {
            pending.handle.abort();
            debug!(due_at = %pending.due_at, "Cancelled pending refresh");
        }
    }

    /// Arm the single refresh timer for `access_token`. Must run after
    /// `cancel_refresh` so the task is tied to the current generation.
    fn arm_refresh(self: &Arc<Self>, shared: &mut Shared, access_token: &str) {
        let Some(claims) = Claims::from_token(access_token) else {
            debug!("Access token payload unreadable; proactive refresh disabled");
            return;
        };
        let (Some(exp), Some(expires_at)) = (claims.exp, claims.expires_at()) else {
            debug!("Access token has no expiry; proactive refresh disabled");
            return;
        };

        let now = Utc::now();
        let delay = claims::refresh_delay(exp, now.timestamp(), self.skew_secs);
        let due_at = delay
            .and_then(|_| DateTime::from_timestamp(exp.saturating_sub(self.skew_secs), 0))
            .unwrap_or(now);

        let generation = shared.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(inner) = weak.upgrade() {
                inner.perform_refresh(generation).await;
            }
        });

        match delay {
            Some(delay) => debug!(
                subject = claims.sub.as_deref().unwrap_or("-"),
                %expires_at,
                delay_secs = delay.as_secs(),
                %due_at,
                "Scheduled token refresh"
            ),
            None => debug!(%expires_at, "Token refresh already due; refreshing now"),
        }
        shared.pending = Some(PendingRefresh { handle, due_at });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(pending) = shared.pending.take() {
            pending.handle.abort();
        }
    }
}
