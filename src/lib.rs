//! # Tradelog (Trade Journal API)
//!
//! `tradelog` is the backend of a trade journal. Users sign up and log in
//! against a managed identity provider (Cognito user pools); profiles and
//! trades live in PostgreSQL.
//!
//! ## Sessions
//!
//! Login returns an `authData` cookie holding the provider's access and
//! refresh tokens together with the user's email and username. Nothing is
//! stored server side: every protected request rebuilds the session from the
//! cookie (or from an `Authorization: Bearer` header) and asks the provider to
//! validate the access token. Expired access tokens are refreshed once,
//! transparently, and the cookie is rewritten with the new token.
//!
//! ## Request pipeline
//!
//! Each route declares the methods it accepts. `OPTIONS` is answered before
//! the method check so browsers can always preflight, and CORS headers are
//! added to every response. Protected routes then pass through the auth
//! middleware, which injects a [`api::middleware::CurrentUser`] for handlers.

pub mod api;
pub mod cli;
pub mod identity;
pub mod session;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
