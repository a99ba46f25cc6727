//! Authentication gate for protected routes.
//!
//! Flow Overview:
//! 1. A well-formed `Authorization: <scheme> <token>` header is validated with
//!    the identity provider and nothing else is consulted.
//! 2. Otherwise the `authData` cookie is decoded and its access token validated.
//! 3. An expired access token is refreshed once with the embedded refresh
//!    token. On success the cookie is rewritten with the new access token; on
//!    failure the cookie is cleared.
//!
//! Handlers read the caller from the [`CurrentUser`] request extension.

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::{
    api::{error::ApiError, SharedIdentity},
    identity::{IdentityError, IdentityProvider},
    session::{self, read_session_cookie, CookieLookup, SessionCookies, SessionError, SessionPayload},
};

const GENERIC_FAILURE: &str = "Something went wrong";

/// Username of the authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub username: String,
}

/// How a request was authenticated.
#[derive(Debug)]
pub(crate) enum Authenticated {
    Header(CurrentUser),
    Cookie(CurrentUser),
    /// Cookie session whose access token had to be refreshed.
    Refreshed {
        user: CurrentUser,
        session: SessionPayload,
    },
}

impl Authenticated {
    fn user(&self) -> &CurrentUser {
        match self {
            Self::Header(user) | Self::Cookie(user) | Self::Refreshed { user, .. } => user,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Rejection {
    InvalidToken,
    MissingCredentials,
    UnreadableCookie,
    MalformedSession(SessionError),
    RefreshFailed,
    Unavailable(IdentityError),
}

impl Rejection {
    fn into_response(self, cookies: &SessionCookies) -> Response {
        match self {
            Self::InvalidToken => {
                ApiError::unauthorized("Invalid or expired access token").into_response()
            }
            Self::MissingCredentials => {
                ApiError::unauthorized("Authentication required").into_response()
            }
            Self::UnreadableCookie => {
                error!("Cookie header is not readable");
                ApiError::internal(GENERIC_FAILURE).into_response()
            }
            Self::MalformedSession(err) => {
                error!("Failed to decode session cookie: {err}");
                ApiError::internal(GENERIC_FAILURE).into_response()
            }
            Self::RefreshFailed => {
                let mut response =
                    ApiError::unauthorized("Refresh Token expired or invalid").into_response();
                SessionCookies::attach(response.headers_mut(), cookies.clear());
                response
            }
            Self::Unavailable(err) => {
                error!("Identity provider unavailable: {err}");
                ApiError::internal(GENERIC_FAILURE).into_response()
            }
        }
    }
}

/// `<scheme> <token>`, exactly two space separated parts.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if !scheme.is_empty() && !token.is_empty() => {
            Some(token)
        }
        _ => None,
    }
}

#[derive(Deserialize)]
struct AccessTokenClaims {
    username: Option<String>,
}

/// `username` claim of a provider-issued JWT, read without verification.
fn token_username(access_token: &str) -> Option<String> {
    let payload = access_token.split('.').nth(1)?;
    let bytes = Base64UrlUnpadded::decode_vec(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<AccessTokenClaims>(&bytes)
        .ok()?
        .username
}

fn classify(err: IdentityError, rejection: Rejection) -> Rejection {
    if err.is_unavailable() {
        Rejection::Unavailable(err)
    } else {
        debug!("Token rejected: {err}");
        rejection
    }
}

/// Resolve the caller from request headers.
pub(crate) async fn authenticate(
    identity: &dyn IdentityProvider,
    headers: &HeaderMap,
) -> Result<Authenticated, Rejection> {
    if let Some(token) = bearer_token(headers) {
        return identity
            .validate_token(token)
            .await
            .map(|owner| {
                Authenticated::Header(CurrentUser {
                    username: owner.username,
                })
            })
            .map_err(|err| classify(err, Rejection::InvalidToken));
    }

    let value = match read_session_cookie(headers) {
        CookieLookup::Present(value) => value,
        CookieLookup::Missing => return Err(Rejection::MissingCredentials),
        CookieLookup::Unreadable => return Err(Rejection::UnreadableCookie),
    };
    let session = session::decode(&value).map_err(Rejection::MalformedSession)?;

    match identity.validate_token(&session.access_token).await {
        Ok(owner) => {
            return Ok(Authenticated::Cookie(CurrentUser {
                username: owner.username,
            }))
        }
        Err(err) if err.is_unavailable() => return Err(Rejection::Unavailable(err)),
        Err(err) => debug!("Access token rejected, refreshing: {err}"),
    }

    let refreshed = identity
        .refresh_token(&session.refresh_token, &session.email)
        .await
        .map_err(|err| classify(err, Rejection::RefreshFailed))?;

    let username = token_username(&refreshed.access_token).unwrap_or_else(|| session.username.clone());
    Ok(Authenticated::Refreshed {
        user: CurrentUser { username },
        session: session.with_access_token(refreshed.access_token),
    })
}

/// Middleware for protected routes.
pub async fn require_auth(
    Extension(identity): Extension<SharedIdentity>,
    Extension(cookies): Extension<SessionCookies>,
    mut request: Request,
    next: Next,
) -> Response {
    let authenticated = match authenticate(identity.as_ref(), request.headers()).await {
        Ok(authenticated) => authenticated,
        Err(rejection) => return rejection.into_response(&cookies),
    };

    request
        .extensions_mut()
        .insert(authenticated.user().clone());

    let mut response = next.run(request).await;

    if let Authenticated::Refreshed { session, .. } = authenticated {
        match cookies.issue(&session) {
            Ok(cookie) => SessionCookies::attach(response.headers_mut(), cookie),
            Err(err) => warn!("Failed to rewrite refreshed session cookie: {err}"),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::FakeIdentity;
    use anyhow::{anyhow, Result};
    use axum::http::{header::COOKIE, HeaderValue};

    fn cookie_headers(session: &SessionPayload) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("authData={}", session::encode(session)?))?,
        );
        Ok(headers)
    }

    fn session(access_token: &str, refresh_token: &str) -> SessionPayload {
        SessionPayload::new(
            access_token.to_string(),
            refresh_token.to_string(),
            "alice@example.com".to_string(),
            "alice".to_string(),
        )
    }

    #[test]
    fn bearer_token_requires_two_parts() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer a b"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn token_username_reads_jwt_claim() {
        let claims = Base64UrlUnpadded::encode_string(br#"{"sub":"1","username":"bob"}"#);
        assert_eq!(
            token_username(&format!("header.{claims}.signature")),
            Some("bob".to_string())
        );
        assert_eq!(token_username("opaque-token"), None);
        assert_eq!(token_username("a.!!!.c"), None);
    }

    #[tokio::test]
    async fn header_path_ignores_cookie() -> Result<()> {
        let identity = FakeIdentity::new().with_token("good", "alice");
        let mut headers = cookie_headers(&session("other", "refresh"))?;
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer good"));

        match authenticate(&identity, &headers).await {
            Ok(Authenticated::Header(user)) => assert_eq!(user.username, "alice"),
            other => return Err(anyhow!("unexpected outcome: {other:?}")),
        }
        assert_eq!(identity.calls(), vec!["validate_token:good"]);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_header_token_is_rejected_without_refresh() -> Result<()> {
        let identity = FakeIdentity::new().with_refresh("refresh", "fresh");
        let mut headers = cookie_headers(&session("expired", "refresh"))?;
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer expired"));

        let result = authenticate(&identity, &headers).await;
        assert!(matches!(result, Err(Rejection::InvalidToken)));
        assert_eq!(identity.calls(), vec!["validate_token:expired"]);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_header_falls_back_to_cookie() -> Result<()> {
        let identity = FakeIdentity::new().with_token("good", "alice");
        let mut headers = cookie_headers(&session("good", "refresh"))?;
        headers.insert(AUTHORIZATION, HeaderValue::from_static("good"));

        let result = authenticate(&identity, &headers).await;
        assert!(matches!(result, Ok(Authenticated::Cookie(ref user)) if user.username == "alice"));
        Ok(())
    }

    #[tokio::test]
    async fn expired_cookie_token_is_refreshed_once() -> Result<()> {
        let identity = FakeIdentity::new().with_refresh("refresh", "fresh");
        let headers = cookie_headers(&session("expired", "refresh"))?;

        match authenticate(&identity, &headers).await {
            Ok(Authenticated::Refreshed { user, session }) => {
                assert_eq!(user.username, "alice");
                assert_eq!(session.access_token, "fresh");
                assert_eq!(session.refresh_token, "refresh");
            }
            other => return Err(anyhow!("unexpected outcome: {other:?}")),
        }
        assert_eq!(
            identity.calls(),
            vec!["validate_token:expired", "refresh_token:refresh:alice@example.com"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn refreshed_username_comes_from_new_token() -> Result<()> {
        let claims = Base64UrlUnpadded::encode_string(br#"{"username":"alice-sub"}"#);
        let fresh = format!("h.{claims}.s");
        let identity = FakeIdentity::new().with_refresh("refresh", &fresh);
        let headers = cookie_headers(&session("expired", "refresh"))?;

        let result = authenticate(&identity, &headers).await;
        assert!(
            matches!(result, Ok(Authenticated::Refreshed { ref user, .. }) if user.username == "alice-sub")
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_is_rejected() -> Result<()> {
        let identity = FakeIdentity::new();
        let headers = cookie_headers(&session("expired", "revoked"))?;
        let result = authenticate(&identity, &headers).await;
        assert!(matches!(result, Err(Rejection::RefreshFailed)));
        Ok(())
    }

    #[tokio::test]
    async fn missing_and_malformed_credentials() -> Result<()> {
        let identity = FakeIdentity::new();

        let result = authenticate(&identity, &HeaderMap::new()).await;
        assert!(matches!(result, Err(Rejection::MissingCredentials)));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("authData=not-base64!"));
        let result = authenticate(&identity, &headers).await;
        assert!(matches!(result, Err(Rejection::MalformedSession(_))));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_bytes(b"authData=\xfa\xfb")?);
        let result = authenticate(&identity, &headers).await;
        assert!(matches!(result, Err(Rejection::UnreadableCookie)));

        assert!(identity.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unavailable_provider_keeps_cookie() -> Result<()> {
        let identity = FakeIdentity::new().unavailable();
        let headers = cookie_headers(&session("token", "refresh"))?;
        let result = authenticate(&identity, &headers).await;
        assert!(matches!(result, Err(Rejection::Unavailable(_))));
        assert_eq!(identity.calls(), vec!["validate_token:token"]);
        Ok(())
    }
}
