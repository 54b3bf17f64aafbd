//! Authentication session management.
//!
//! This module provides:
//! - `SessionStore`: durable copy of the access/refresh token pair
//! - `SessionManager`: the token lifecycle (login, boot-time validation,
//!   proactive refresh, logout) and the observable session state
//! - `claims`: access-token payload decoding and refresh timing
//!
//! Tokens are refreshed 60 seconds before they expire. A rejected refresh
//! ends the session.

pub mod claims;
pub mod error;
pub mod lifecycle;
pub mod store;

pub use claims::{Claims, TokenDecodeError};
pub use error::AuthError;
pub use lifecycle::{SessionManager, SubscriptionId, REFRESH_SKEW_SECS};
pub use store::SessionStore;
