use thiserror::Error;

use super::claims::TokenDecodeError;
use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The server refused the credentials or the request; carries the
    /// message meant for the user
    #[error("{0}")]
    Credentials(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid token: {0}")]
    TokenDecode(#[from] TokenDecodeError),

    /// The refresh token was rejected
    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Classify a failed user-initiated call. Rejections keep the server's
    /// `detail`, or `fallback` when it sent none.
    pub fn from_api(err: ApiError, fallback: &str) -> Self {
        if err.is_rejection() {
            let message = err.detail().unwrap_or(fallback).to_string();
            AuthError::Credentials(message)
        } else {
            AuthError::Network(err.to_string())
        }
    }

    /// Classify a failed refresh call
    pub fn from_refresh(err: ApiError) -> Self {
        if err.is_rejection() {
            AuthError::SessionExpired
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_keeps_detail() {
        let err = AuthError::from_api(
            ApiError::Unauthorized("Invalid credentials".into()),
            "Login failed",
        );
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn test_from_api_fallback_message() {
        let err = AuthError::from_api(ApiError::Unauthorized(String::new()), "Login failed");
        assert!(matches!(err, AuthError::Credentials(ref m) if m == "Login failed"));

        let err = AuthError::from_api(ApiError::BadRequest(String::new()), "Registration failed");
        assert_eq!(err.to_string(), "Registration failed");
    }

    #[test]
    fn test_server_failure_is_network_error() {
        let err = AuthError::from_api(ApiError::ServerError("boom".into()), "Login failed");
        assert!(matches!(err, AuthError::Network(_)));
    }

    #[test]
    fn test_rate_limit_keeps_its_reason() {
        let err = AuthError::from_api(ApiError::RateLimited, "Login failed");
        assert!(matches!(err, AuthError::Network(_)));
        assert!(err.to_string().contains("Rate limited"));
    }

    #[test]
    fn test_from_refresh() {
        assert!(matches!(
            AuthError::from_refresh(ApiError::Unauthorized("expired".into())),
            AuthError::SessionExpired
        ));
        assert!(matches!(
            AuthError::from_refresh(ApiError::InvalidResponse("bad".into())),
            AuthError::Network(_)
        ));
    }
}
