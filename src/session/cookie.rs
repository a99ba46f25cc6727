//! `authData` cookie issuing, clearing, and lookup.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::{DateTime, Duration, Utc};

use super::{encode, SessionError, SessionPayload};

pub const SESSION_COOKIE_NAME: &str = "authData";
pub const SESSION_COOKIE_TTL_DAYS: i64 = 30;

const EXPIRED_COOKIE: &str =
    "authData=; Path=/; HttpOnly; SameSite=Lax; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0";
const EXPIRED_COOKIE_SECURE: &str = "authData=; Path=/; HttpOnly; SameSite=Lax; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; Secure";

/// Result of looking for the session cookie on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieLookup {
    Present(String),
    Missing,
    /// A `Cookie` header exists but is not readable text.
    Unreadable,
}

/// Builds `Set-Cookie` values for the session cookie.
#[derive(Clone, Debug)]
pub struct SessionCookies {
    secure: bool,
    ttl_days: i64,
}

impl SessionCookies {
    #[must_use]
    pub fn new(secure: bool) -> Self {
        Self {
            secure,
            ttl_days: SESSION_COOKIE_TTL_DAYS,
        }
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// Cookie carrying the encoded session, valid for 30 days.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be encoded.
    pub fn issue(&self, payload: &SessionPayload) -> Result<HeaderValue, SessionError> {
        self.issue_at(payload, Utc::now())
    }

    fn issue_at(
        &self,
        payload: &SessionPayload,
        now: DateTime<Utc>,
    ) -> Result<HeaderValue, SessionError> {
        let value = encode(payload)?;
        let expires = (now + Duration::days(self.ttl_days)).format("%a, %d %b %Y %H:%M:%S GMT");
        let max_age = self.ttl_days * 24 * 60 * 60;
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Expires={expires}; Max-Age={max_age}"
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// Cookie that empties `authData` and expires it at the epoch.
    #[must_use]
    pub fn clear(&self) -> HeaderValue {
        if self.secure {
            HeaderValue::from_static(EXPIRED_COOKIE_SECURE)
        } else {
            HeaderValue::from_static(EXPIRED_COOKIE)
        }
    }

    /// Append a cookie to response headers.
    pub fn attach(headers: &mut HeaderMap, cookie: HeaderValue) {
        headers.append(SET_COOKIE, cookie);
    }
}

/// Find the `authData` cookie across every `Cookie` header.
#[must_use]
pub fn read_session_cookie(headers: &HeaderMap) -> CookieLookup {
    let mut unreadable = false;
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            unreadable = true;
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME {
                return CookieLookup::Present(val.trim().to_string());
            }
        }
    }
    if unreadable {
        CookieLookup::Unreadable
    } else {
        CookieLookup::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::decode;
    use anyhow::{Context, Result};
    use chrono::TimeZone;

    fn payload() -> SessionPayload {
        SessionPayload::new(
            "access".to_string(),
            "refresh".to_string(),
            "bob@example.com".to_string(),
            "bob".to_string(),
        )
    }

    #[test]
    fn issued_cookie_expires_in_thirty_days() -> Result<()> {
        let now = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .context("invalid timestamp")?;
        let cookie = SessionCookies::new(false).issue_at(&payload(), now)?;
        let cookie = cookie.to_str()?;
        assert!(cookie.starts_with("authData="));
        assert!(cookie.contains("Expires=Wed, 31 Jan 2024 00:00:00 GMT"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
        Ok(())
    }

    #[test]
    fn issued_cookie_value_decodes_to_session() -> Result<()> {
        let cookie = SessionCookies::new(true).issue(&payload())?;
        let cookie = cookie.to_str()?;
        assert!(cookie.ends_with("; Secure"));
        let value = cookie
            .strip_prefix("authData=")
            .and_then(|rest| rest.split(';').next())
            .context("missing cookie value")?;
        assert_eq!(decode(value)?, payload());
        Ok(())
    }

    #[test]
    fn cleared_cookie_is_empty_and_expired() -> Result<()> {
        let cleared = SessionCookies::new(false).clear();
        let cleared = cleared.to_str()?;
        assert!(cleared.starts_with("authData=;"));
        assert!(cleared.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(cleared.contains("Max-Age=0"));
        let secure = SessionCookies::new(true).clear();
        assert!(secure.to_str()?.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn read_session_cookie_finds_value_with_padding() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; authData=eyJhIjoiYiJ9==; lang=en"),
        );
        assert_eq!(
            read_session_cookie(&headers),
            CookieLookup::Present("eyJhIjoiYiJ9==".to_string())
        );
    }

    #[test]
    fn read_session_cookie_scans_every_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(COOKIE, HeaderValue::from_static("authData=abc"));
        assert_eq!(
            read_session_cookie(&headers),
            CookieLookup::Present("abc".to_string())
        );
    }

    #[test]
    fn read_session_cookie_reports_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(read_session_cookie(&headers), CookieLookup::Missing);
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(read_session_cookie(&headers), CookieLookup::Missing);
    }

    #[test]
    fn read_session_cookie_reports_unreadable_header() -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_bytes(b"authData=\xfa\xfb")?);
        assert_eq!(read_session_cookie(&headers), CookieLookup::Unreadable);
        Ok(())
    }
}
