//! Access-token payload decoding.
//!
//! Only the payload segment is read; signatures are the server's business.
//! Decoding failures never escape [`Claims::from_token`], they just mean
//! there is no expiry to schedule against.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TokenDecodeError {
    #[error("token is not three base64url segments")]
    Malformed,

    #[error("expected 3 dot-separated segments, found {0}")]
    SegmentCount(usize),

    #[error("payload segment is empty")]
    EmptyPayload,

    #[error("payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Expiry, Unix seconds
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Claims {
    /// Decode claims, swallowing any failure.
    pub fn from_token(token: &str) -> Option<Self> {
        match decode_claims(token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                debug!(error = %e, "Token payload could not be decoded");
                None
            }
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

pub fn decode_claims(token: &str) -> Result<Claims, TokenDecodeError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenDecodeError::SegmentCount(segments.len()));
    }
    let payload = segments[1];
    if payload.is_empty() {
        return Err(TokenDecodeError::EmptyPayload);
    }

    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| general_purpose::URL_SAFE.decode(payload))?;
    Ok(serde_json::from_slice(&decoded)?)
}

/// Structural check: three non-empty base64url segments.
pub fn is_well_formed(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'='))
        })
}

/// How long to wait before refreshing a token that expires at `exp`.
///
/// Returns `None` when the refresh is already due, i.e.
/// `exp - now - skew <= 0`.
pub fn refresh_delay(exp: i64, now: i64, skew_secs: i64) -> Option<Duration> {
    let delay = exp.saturating_sub(now).saturating_sub(skew_secs);
    if delay > 0 {
        Some(Duration::from_secs(delay as u64))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{token_with_claims, token_with_exp};
    use serde_json::json;

    #[test]
    fn test_decode_exp() {
        let token = token_with_exp("T1", 1_700_000_000);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.sub.as_deref(), Some("T1"));
    }

    #[test]
    fn test_decode_padded_payload() {
        let payload = general_purpose::URL_SAFE.encode(br#"{"exp":12}"#);
        let token = format!("h.{}.s", payload);
        assert_eq!(decode_claims(&token).unwrap().exp, Some(12));
    }

    #[test]
    fn test_missing_exp_is_not_an_error() {
        let token = token_with_claims(json!({"sub": "someone"}));
        let claims = Claims::from_token(&token).unwrap();
        assert_eq!(claims.exp, None);
        assert_eq!(claims.expires_at(), None);
    }

    #[test]
    fn test_malformed_tokens_yield_no_claims() {
        // "not json" in base64url
        let not_json = format!("h.{}.s", general_purpose::URL_SAFE_NO_PAD.encode("not json"));
        let cases = ["", "abc", "a.b", "h..s", "h.%%%.s", not_json.as_str(), "a.b.c.d"];
        for token in cases {
            assert!(Claims::from_token(token).is_none(), "token {:?}", token);
        }
    }

    #[test]
    fn test_decode_error_kinds() {
        assert!(matches!(
            decode_claims("a.b"),
            Err(TokenDecodeError::SegmentCount(2))
        ));
        assert!(matches!(
            decode_claims("h..s"),
            Err(TokenDecodeError::EmptyPayload)
        ));
        assert!(matches!(
            decode_claims("h.%%%.s"),
            Err(TokenDecodeError::Base64(_))
        ));
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed(&token_with_exp("T1", 1)));
        assert!(is_well_formed("aGVhZGVy.cGF5bG9hZA.c2ln"));
        assert!(!is_well_formed("a.b"));
        assert!(!is_well_formed("a..c"));
        assert!(!is_well_formed("a.b c.d"));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn test_refresh_delay_subtracts_skew() {
        let now = 1_000;
        assert_eq!(
            refresh_delay(now + 3600, now, 60),
            Some(Duration::from_secs(3540))
        );
    }

    #[test]
    fn test_refresh_delay_due_now() {
        let now = 1_000;
        assert_eq!(refresh_delay(now + 60, now, 60), None);
        assert_eq!(refresh_delay(now + 30, now, 60), None);
        assert_eq!(refresh_delay(now - 500, now, 60), None);
        assert_eq!(refresh_delay(i64::MIN, now, 60), None);
        assert_eq!(
            refresh_delay(now + 61, now, 60),
            Some(Duration::from_secs(1))
        );
    }
}
