//! sessionkeeper-core - client-side authentication session management.
//!
//! Acquires, persists, refreshes and invalidates a bearer-token pair
//! (access token + refresh token) for a remote JSON auth API.
//!
//! - `auth`: the session lifecycle manager, token store and claims decoding
//! - `api`: the remote endpoint contract and its HTTP implementation
//! - `storage`: durable key-value backends (file, OS keychain, memory)
//! - `models`: credentials, principal and session state
//! - `config`: user configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, AuthApi, HttpAuthApi};
pub use auth::{AuthError, SessionManager, SessionStore};
pub use config::{Config, StorageBackend};
pub use models::{Credentials, Principal, SessionState, TokenResponse};
