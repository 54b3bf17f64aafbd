//! HTTP implementation of [`AuthApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::{ApiError, AuthApi};
use crate::config::Config;
use crate::models::{Principal, TokenResponse};

/// Default base URL of the auth service
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    role: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Auth API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::with_timeout(
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post_json<B: Serialize>(&self, path: &str, body: &B) -> RequestBuilder {
        self.client.post(self.url(path)).json(body)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send_json<T: DeserializeOwned>(
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, ApiError> {
        let response = Self::check_response(request.send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e))
        })
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn register(
        &self,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<TokenResponse, ApiError> {
        debug!(email, role, "POST /auth/register");
        let body = RegisterRequest {
            email,
            password,
            role,
        };
        Self::send_json(self.post_json("/auth/register", &body), "register").await
    }

    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        debug!(email, "POST /auth/login");
        let body = LoginRequest { email, password };
        Self::send_json(self.post_json("/auth/login", &body), "login").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        debug!("POST /auth/refresh");
        let body = RefreshRequest { refresh_token };
        Self::send_json(self.post_json("/auth/refresh", &body), "refresh").await
    }

    async fn me(&self, access_token: &str) -> Result<Principal, ApiError> {
        debug!("GET /auth/me");
        let request = self.client.get(self.url("/auth/me")).bearer_auth(access_token);
        Self::send_json(request, "user").await
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        debug!("POST /auth/logout");
        let body = RefreshRequest { refresh_token };
        let response = self.post_json("/auth/logout", &body).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = HttpAuthApi::new("http://localhost:8000/").unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("/auth/me"), "http://localhost:8000/auth/me");
    }

    #[test]
    fn test_login_request_shape() {
        let api = HttpAuthApi::new(DEFAULT_BASE_URL).unwrap();
        let request = api
            .post_json(
                "/auth/login",
                &LoginRequest {
                    email: "a@b.com",
                    password: "pw",
                },
            )
            .build()
            .unwrap();

        assert_eq!(request.method(), "POST");
        assert_eq!(request.url().as_str(), "http://localhost:8000/auth/login");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json, serde_json::json!({"email": "a@b.com", "password": "pw"}));
    }

    #[test]
    fn test_refresh_request_shape() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "R1" }).unwrap();
        assert_eq!(body, serde_json::json!({"refresh_token": "R1"}));
    }

    #[test]
    fn test_register_request_shape() {
        let body = serde_json::to_value(RegisterRequest {
            email: "a@b.com",
            password: "pw",
            role: "streamer",
        })
        .unwrap();
        assert_eq!(body["role"], "streamer");
    }
}
