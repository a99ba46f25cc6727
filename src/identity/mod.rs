//! Identity provider client.
//!
//! All credential state lives in the remote user pool. This module exposes the
//! operations the API needs behind the [`IdentityProvider`] trait so handlers
//! and the auth middleware can be exercised with test doubles; the production
//! implementation is [`CognitoClient`].
//!
//! Every call is a single network round trip with no retries. Callers decide
//! what to do with failures; the only retry in the service is the one-shot
//! token refresh in the auth middleware.

mod cognito;
mod config;
mod signing;

pub use cognito::CognitoClient;
pub use config::{AwsCredentials, IdentityConfig};

use std::{fmt, future::Future, pin::Pin};
use thiserror::Error;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("an account with this email already exists")]
    AlreadyExists,
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    InvalidCode(String),
    #[error("too many requests")]
    RateLimited,
    #[error("too many failed attempts")]
    TooManyFailedAttempts,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is not confirmed")]
    NotConfirmed,
    #[error("access token is invalid or expired")]
    InvalidOrExpiredToken,
    #[error("refresh token is invalid or expired")]
    InvalidOrExpiredRefreshToken,
    #[error("user not found")]
    UserNotFound,
    #[error("authentication challenge required: {0}")]
    ChallengeRequired(String),
    #[error("{kind}: {message}")]
    Service { kind: String, message: String },
    #[error("identity provider fault {kind}: {message}")]
    ServerFault { kind: String, message: String },
    #[error("identity provider is misconfigured: {0}")]
    Configuration(String),
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected identity provider response: {0}")]
    Protocol(String),
}

impl IdentityError {
    /// The provider could not be reached or answered with something unusable,
    /// as opposed to rejecting the request.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Protocol(_)
                | Self::Configuration(_)
                | Self::ServerFault { .. }
        )
    }
}

/// Registration details for a new account.
#[derive(Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Tokens issued on a successful password login.
#[derive(Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthTokens([REDACTED])")
    }
}

/// Access token issued by a refresh.
#[derive(Clone)]
pub struct RefreshedToken {
    pub access_token: String,
}

impl fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshedToken([REDACTED])")
    }
}

/// Owner of a valid access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenOwner {
    pub username: String,
}

/// Profile attributes held by the provider for one user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderUser {
    pub username: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

pub trait IdentityProvider: Send + Sync {
    /// Register a pending account.
    fn sign_up<'a>(&'a self, account: &'a NewAccount) -> BoxFuture<'a, IdentityResult<()>>;

    /// Activate a pending account with the emailed code.
    fn confirm_sign_up<'a>(
        &'a self,
        email: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>>;

    fn resend_confirmation_code<'a>(&'a self, email: &'a str)
        -> BoxFuture<'a, IdentityResult<()>>;

    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, IdentityResult<AuthTokens>>;

    /// Resolve the owner of an access token.
    fn validate_token<'a>(&'a self, access_token: &'a str)
        -> BoxFuture<'a, IdentityResult<TokenOwner>>;

    /// Exchange a refresh token for a new access token.
    fn refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<RefreshedToken>>;

    fn forgot_password<'a>(&'a self, email: &'a str) -> BoxFuture<'a, IdentityResult<()>>;

    fn confirm_forgot_password<'a>(
        &'a self,
        code: &'a str,
        password: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>>;

    /// Administrative lookup of a user's profile attributes.
    fn admin_get_user<'a>(&'a self, username: &'a str)
        -> BoxFuture<'a, IdentityResult<ProviderUser>>;
}
