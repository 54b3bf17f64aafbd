//! Test helpers: token builders and a scripted `AuthApi`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde_json::json;

use crate::api::{ApiError, AuthApi};
use crate::models::{Principal, TokenResponse};
use crate::storage::{KeyValueStore, MemoryStore};

/// Unsigned JWT-shaped token carrying `claims`
pub(crate) fn token_with_claims(claims: serde_json::Value) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

pub(crate) fn token_with_exp(label: &str, exp: i64) -> String {
    token_with_claims(json!({"sub": label, "exp": exp}))
}

/// Token expiring `secs` seconds from now (wall clock)
pub(crate) fn token_expiring_in(label: &str, secs: i64) -> String {
    token_with_exp(label, Utc::now().timestamp() + secs)
}

pub(crate) fn tokens(access: &str, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        token_type: "bearer".to_string(),
        refresh_token: refresh.map(str::to_string),
    }
}

pub(crate) fn principal(id: i64, email: &str) -> Principal {
    Principal {
        id,
        email: email.to_string(),
        role: "viewer".to_string(),
        is_active: true,
    }
}

/// Let spawned tasks that are ready to run make progress.
/// Under paused time this returns as soon as the runtime is idle.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

type Scripted<T> = Mutex<VecDeque<Result<T, ApiError>>>;

/// `AuthApi` answering from scripted queues and recording every call as
/// `"<operation>:<argument>"`.
#[derive(Default)]
pub(crate) struct MockAuthApi {
    users: Mutex<HashMap<String, Principal>>,
    login: Scripted<TokenResponse>,
    register: Scripted<TokenResponse>,
    refresh: Scripted<TokenResponse>,
    refresh_latency: Mutex<Option<Duration>>,
    logout_fails: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockAuthApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make who-am-I resolve `access_token` to `user`
    pub(crate) fn accept_token(&self, access_token: &str, user: Principal) {
        self.users
            .lock()
            .unwrap()
            .insert(access_token.to_string(), user);
    }

    pub(crate) fn push_login(&self, result: Result<TokenResponse, ApiError>) {
        self.login.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_register(&self, result: Result<TokenResponse, ApiError>) {
        self.register.lock().unwrap().push_back(result);
    }

    pub(crate) fn push_refresh(&self, result: Result<TokenResponse, ApiError>) {
        self.refresh.lock().unwrap().push_back(result);
    }

    pub(crate) fn set_refresh_latency(&self, latency: Duration) {
        *self.refresh_latency.lock().unwrap() = Some(latency);
    }

    pub(crate) fn fail_logout(&self) {
        self.logout_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(queue: &Scripted<TokenResponse>) -> Result<TokenResponse, ApiError> {
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::ServerError("no scripted response".into())))
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn register(
        &self,
        email: &str,
        _password: &str,
        role: &str,
    ) -> Result<TokenResponse, ApiError> {
        self.record(format!("register:{}:{}", email, role));
        Self::next(&self.register)
    }

    async fn login(&self, email: &str, _password: &str) -> Result<TokenResponse, ApiError> {
        self.record(format!("login:{}", email));
        Self::next(&self.login)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        self.record(format!("refresh:{}", refresh_token));
        let latency = *self.refresh_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Self::next(&self.refresh)
    }

    async fn me(&self, access_token: &str) -> Result<Principal, ApiError> {
        self.record(format!("me:{}", access_token));
        self.users
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".into()))
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        self.record(format!("logout:{}", refresh_token));
        if self.logout_fails.load(Ordering::SeqCst) {
            Err(ApiError::ServerError("unavailable".into()))
        } else {
            Ok(())
        }
    }
}

/// Memory-backed store whose `n`th `set` call (1-based) fails.
pub(crate) struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_on: usize,
    sets: AtomicUsize,
}

impl FlakyStore {
    pub(crate) fn failing_on_set(inner: Arc<MemoryStore>, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            sets: AtomicUsize::new(0),
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        if self.sets.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            anyhow::bail!("disk full writing {}", key);
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }
}
