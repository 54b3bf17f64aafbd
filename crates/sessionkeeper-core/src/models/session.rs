use std::fmt;

use serde::{Deserialize, Serialize};

/// Access token plus the optional refresh token that goes with it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Build the credentials that follow a refresh.
    /// The refresh token is rotated only when the server supplied a new one.
    pub fn rotated(&self, response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or_else(|| self.refresh_token.clone()),
        }
    }
}

impl From<TokenResponse> for Credentials {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        }
    }
}

// Tokens are secrets; keep them out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// The authenticated user, as returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub is_active: bool,
}

/// Body returned by register, login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// The single session state observed by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    /// A persisted token is being validated at startup
    Initializing,
    Authenticated {
        user: Principal,
        #[serde(skip)]
        credentials: Credentials,
    },
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            SessionState::Authenticated { credentials, .. } => Some(credentials),
            _ => None,
        }
    }

    /// Short label for logs and status output
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Initializing => "initializing",
            SessionState::Authenticated { .. } => "authenticated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: &str, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            token_type: "bearer".to_string(),
            refresh_token: refresh.map(str::to_string),
        }
    }

    #[test]
    fn test_rotated_keeps_refresh_token_when_absent() {
        let current = Credentials::new("T1", Some("R1".to_string()));
        let next = current.rotated(response("T2", None));
        assert_eq!(next.access_token, "T2");
        assert_eq!(next.refresh_token.as_deref(), Some("R1"));
    }

    #[test]
    fn test_rotated_replaces_refresh_token_when_supplied() {
        let current = Credentials::new("T1", Some("R1".to_string()));
        let next = current.rotated(response("T2", Some("R2")));
        assert_eq!(next.refresh_token.as_deref(), Some("R2"));
    }

    #[test]
    fn test_token_response_without_refresh_token() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a.b.c","token_type":"bearer"}"#).unwrap();
        assert_eq!(parsed.refresh_token, None);
        assert_eq!(parsed.token_type, "bearer");
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("secret-access", Some("secret-refresh".to_string()));
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_session_state_serializes_without_tokens() {
        let state = SessionState::Authenticated {
            user: Principal {
                id: 1,
                email: "a@b.com".to_string(),
                role: "viewer".to_string(),
                is_active: true,
            },
            credentials: Credentials::new("T1", None),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "authenticated");
        assert_eq!(json["user"]["email"], "a@b.com");
        assert!(json.get("credentials").is_none());
    }
}
