//! Remote authentication endpoint.
//!
//! `AuthApi` is the contract the lifecycle manager depends on;
//! `HttpAuthApi` implements it against a FastAPI-style JSON service:
//!
//! | operation | route                 |
//! |-----------|-----------------------|
//! | register  | `POST /auth/register` |
//! | login     | `POST /auth/login`    |
//! | refresh   | `POST /auth/refresh`  |
//! | who-am-I  | `GET /auth/me`        |
//! | logout    | `POST /auth/logout`   |

pub mod client;
pub mod error;

pub use client::HttpAuthApi;
pub use error::ApiError;

use async_trait::async_trait;

use crate::models::{Principal, TokenResponse};

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<TokenResponse, ApiError>;

    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError>;

    /// Resolve the principal owning `access_token`
    async fn me(&self, access_token: &str) -> Result<Principal, ApiError>;

    /// Revoke `refresh_token` server-side
    async fn logout(&self, refresh_token: &str) -> Result<(), ApiError>;
}
