//! Per-route method allow-list and CORS headers.
//!
//! `OPTIONS` is answered before the method check so preflight requests always
//! succeed. Every other response leaving a route gets the CORS headers too.

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
            ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
            ALLOW, VARY,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;

use crate::api::error::ApiError;

const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-Request-Id";
const PREFLIGHT_MAX_AGE: &str = "600";

#[derive(Clone, Debug)]
pub struct CorsConfig {
    origin: HeaderValue,
    credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: HeaderValue::from_static("*"),
            credentials: false,
        }
    }
}

impl CorsConfig {
    /// `*` allows any origin; anything else is echoed exactly and allows credentials.
    ///
    /// # Errors
    /// Returns an error if the origin is not a valid header value.
    pub fn new(origin: &str) -> Result<Self> {
        let origin = origin.trim();
        if origin.is_empty() || origin == "*" {
            return Ok(Self::default());
        }
        let origin = HeaderValue::from_str(origin.trim_end_matches('/'))
            .with_context(|| format!("Invalid CORS origin: {origin}"))?;
        Ok(Self {
            origin,
            credentials: true,
        })
    }

    #[must_use]
    pub fn origin(&self) -> &HeaderValue {
        &self.origin
    }

    /// Headers added to every response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        if self.credentials {
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        headers.append(VARY, HeaderValue::from_static("Origin"));
    }

    /// `200` answer to a preflight request.
    #[must_use]
    pub fn preflight(&self, allow: &HeaderValue) -> Response {
        let mut response = StatusCode::OK.into_response();
        let headers = response.headers_mut();
        self.apply(headers);
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, allow.clone());
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        headers.insert(ALLOW, allow.clone());
        response
    }
}

/// Methods accepted by one route.
#[derive(Clone, Debug)]
pub struct AllowedMethods {
    methods: Arc<[Method]>,
    allow: HeaderValue,
    cors: CorsConfig,
}

impl AllowedMethods {
    #[must_use]
    pub fn new(methods: &[Method], cors: CorsConfig) -> Self {
        Self {
            allow: allow_header(methods),
            methods: methods.into(),
            cors,
        }
    }

    #[must_use]
    pub fn permits(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    #[must_use]
    pub fn allow(&self) -> &HeaderValue {
        &self.allow
    }
}

fn allow_header(methods: &[Method]) -> HeaderValue {
    let mut names: Vec<&str> = methods.iter().map(Method::as_str).collect();
    if !methods.contains(&Method::OPTIONS) {
        names.push(Method::OPTIONS.as_str());
    }
    HeaderValue::from_str(&names.join(", ")).unwrap_or_else(|_| HeaderValue::from_static("OPTIONS"))
}

pub async fn method_filter(
    State(policy): State<AllowedMethods>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return policy.cors.preflight(&policy.allow);
    }

    let mut response = if policy.permits(request.method()) {
        next.run(request).await
    } else {
        let mut response = ApiError::NotAllowed.into_response();
        response.headers_mut().insert(ALLOW, policy.allow.clone());
        response
    };

    policy.cors.apply(response.headers_mut());
    response
}

/// Unknown paths: preflight still succeeds, everything else is `404`.
pub async fn fallback(method: Method, Extension(cors): Extension<CorsConfig>) -> Response {
    if method == Method::OPTIONS {
        return cors.preflight(&allow_header(&[Method::GET, Method::POST]));
    }
    let mut response = ApiError::NotFound("Not Found".to_string()).into_response();
    cors.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_header_lists_options_once() {
        assert_eq!(allow_header(&[Method::POST]), "POST, OPTIONS");
        assert_eq!(
            allow_header(&[Method::GET, Method::OPTIONS]),
            "GET, OPTIONS"
        );
    }

    #[test]
    fn wildcard_origin_does_not_allow_credentials() -> Result<()> {
        let cors = CorsConfig::new("*")?;
        let mut headers = HeaderMap::new();
        cors.apply(&mut headers);
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("*"))
        );
        assert!(headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
        Ok(())
    }

    #[test]
    fn explicit_origin_is_echoed_with_credentials() -> Result<()> {
        let cors = CorsConfig::new("https://app.tradelog.dev/")?;
        assert_eq!(cors.origin(), "https://app.tradelog.dev");

        let mut headers = HeaderMap::new();
        cors.apply(&mut headers);
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some(&HeaderValue::from_static("true"))
        );
        assert_eq!(headers.get(VARY), Some(&HeaderValue::from_static("Origin")));
        Ok(())
    }

    #[test]
    fn invalid_origin_is_rejected() {
        assert!(CorsConfig::new("https://bad\norigin").is_err());
    }

    #[test]
    fn preflight_advertises_methods_and_headers() {
        let policy = AllowedMethods::new(&[Method::POST], CorsConfig::default());
        let response = policy.cors.preflight(policy.allow());
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_METHODS),
            Some(&HeaderValue::from_static("POST, OPTIONS"))
        );
        assert!(headers.get(ACCESS_CONTROL_ALLOW_HEADERS).is_some());
        assert!(policy.permits(&Method::POST));
        assert!(!policy.permits(&Method::GET));
    }
}
