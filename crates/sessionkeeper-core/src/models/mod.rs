//! Data models shared by the session store, the lifecycle manager and
//! the remote auth API.
//!
//! - `Credentials`: the persisted access/refresh token pair
//! - `Principal`: the authenticated user returned by who-am-I
//! - `SessionState`: what consumers observe
//! - `TokenResponse`: wire shape of register/login/refresh responses

pub mod session;

pub use session::{Credentials, Principal, SessionState, TokenResponse};
