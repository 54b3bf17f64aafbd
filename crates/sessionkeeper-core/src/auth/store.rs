use std::sync::Arc;

use anyhow::Result;

use crate::models::Credentials;
use crate::storage::KeyValueStore;

/// Persistence key for the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Persistence key for the refresh token (may be absent)
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Durable copy of the current credentials.
///
/// No validation happens here; the lifecycle manager decides what is
/// worth persisting.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Load persisted credentials. A refresh token without an access token
    /// is not a session.
    pub fn get(&self) -> Result<Option<Credentials>> {
        let Some(access_token) = self.backend.get(ACCESS_TOKEN_KEY)? else {
            return Ok(None);
        };
        let refresh_token = self.backend.get(REFRESH_TOKEN_KEY)?;
        Ok(Some(Credentials {
            access_token,
            refresh_token,
        }))
    }

    pub fn set(&self, credentials: &Credentials) -> Result<()> {
        self.backend.set(ACCESS_TOKEN_KEY, &credentials.access_token)?;
        match credentials.refresh_token {
            Some(ref refresh_token) => self.backend.set(REFRESH_TOKEN_KEY, refresh_token),
            // Never leave a previous session's refresh token behind
            None => self.backend.remove(REFRESH_TOKEN_KEY),
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.backend.remove(ACCESS_TOKEN_KEY)?;
        self.backend.remove(REFRESH_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.backend.get(REFRESH_TOKEN_KEY)
    }

    pub fn has_access_token(&self) -> bool {
        matches!(self.backend.get(ACCESS_TOKEN_KEY), Ok(Some(_)))
    }
}
