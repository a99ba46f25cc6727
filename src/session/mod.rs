//! Session payload codec.
//!
//! The session is held entirely by the client: the provider's tokens plus the
//! user's email and username, serialized to JSON and base64 encoded so the
//! result is safe to carry in a cookie. Field names on the wire are kept as
//! `refreshToken`, `accessToken`, `email` and `Username` so cookies issued by
//! earlier deployments still decode.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod cookie;

pub use cookie::{
    read_session_cookie, CookieLookup, SessionCookies, SESSION_COOKIE_NAME,
    SESSION_COOKIE_TTL_DAYS,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session cookie is empty")]
    Empty,
    #[error("session cookie is not valid base64")]
    Encoding,
    #[error("session payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("session cookie is not a valid header value")]
    Header(#[from] axum::http::header::InvalidHeaderValue),
}

/// Tokens and identity carried in the `authData` cookie.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "accessToken")]
    pub access_token: String,
    pub email: String,
    #[serde(rename = "Username")]
    pub username: String,
}

impl SessionPayload {
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: String,
        email: String,
        username: String,
    ) -> Self {
        Self {
            refresh_token,
            access_token,
            email,
            username,
        }
    }

    /// Same session with a freshly issued access token.
    #[must_use]
    pub fn with_access_token(mut self, access_token: String) -> Self {
        self.access_token = access_token;
        self
    }
}

// Tokens never end up in logs.
impl fmt::Debug for SessionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPayload")
            .field("refresh_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("email", &self.email)
            .field("username", &self.username)
            .finish()
    }
}

/// Serialize and encode a session for cookie transport.
///
/// # Errors
/// Returns an error if the payload cannot be serialized.
pub fn encode(payload: &SessionPayload) -> Result<String, SessionError> {
    let json = serde_json::to_vec(payload)?;
    Ok(Base64::encode_string(&json))
}

/// Decode a cookie value back into a session.
///
/// # Errors
/// Returns an error when the value is empty, not base64, or not a session
/// payload. Callers treat every error as "no usable session".
pub fn decode(value: &str) -> Result<SessionPayload, SessionError> {
    let trimmed = value.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Err(SessionError::Empty);
    }
    let bytes = Base64::decode_vec(trimmed).map_err(|_| SessionError::Encoding)?;
    Ok(serde_json::from_slice(&bytes)?)
}
