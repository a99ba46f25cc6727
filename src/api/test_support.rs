//! Scripted identity provider for handler and middleware tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    api::{ApiConfig, SharedIdentity, SharedStore},
    identity::{
        AuthTokens, BoxFuture, IdentityError, IdentityProvider, IdentityResult, NewAccount,
        ProviderUser, RefreshedToken, TokenOwner,
    },
    storage::memory::MemoryStore,
};

type Failure = fn() -> IdentityError;

#[derive(Default)]
pub(crate) struct FakeIdentity {
    tokens: HashMap<String, String>,
    refresh: HashMap<String, String>,
    logins: HashMap<String, (String, String, String)>,
    users: HashMap<String, ProviderUser>,
    failures: HashMap<&'static str, Failure>,
    unavailable: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeIdentity {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Access token accepted for `username`.
    pub(crate) fn with_token(mut self, token: &str, username: &str) -> Self {
        self.tokens.insert(token.to_string(), username.to_string());
        self
    }

    /// Refresh token exchanged for `access_token`.
    pub(crate) fn with_refresh(mut self, refresh_token: &str, access_token: &str) -> Self {
        self.refresh
            .insert(refresh_token.to_string(), access_token.to_string());
        self
    }

    pub(crate) fn with_login(
        mut self,
        email: &str,
        password: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Self {
        self.logins.insert(
            email.to_string(),
            (
                password.to_string(),
                access_token.to_string(),
                refresh_token.to_string(),
            ),
        );
        self
    }

    /// Provider profile, found by username or email like an alias-enabled pool.
    pub(crate) fn with_user(mut self, user: ProviderUser) -> Self {
        if let Some(email) = &user.email {
            self.users.insert(email.clone(), user.clone());
        }
        self.users.insert(user.username.clone(), user);
        self
    }

    /// Make every call to `operation` fail with the given error.
    pub(crate) fn failing(mut self, operation: &'static str, failure: Failure) -> Self {
        self.failures.insert(operation, failure);
        self
    }

    /// Every call fails as if the provider could not be reached.
    pub(crate) fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub(crate) fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn record(&self, operation: &'static str, call: String) -> IdentityResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.unavailable {
            return Err(IdentityError::Protocol("provider unavailable".to_string()));
        }
        match self.failures.get(operation) {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }
}

impl IdentityProvider for FakeIdentity {
    fn sign_up<'a>(&'a self, account: &'a NewAccount) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(async move { self.record("sign_up", format!("sign_up:{}", account.email)) })
    }

    fn confirm_sign_up<'a>(
        &'a self,
        email: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(async move {
            self.record("confirm_sign_up", format!("confirm_sign_up:{email}:{code}"))
        })
    }

    fn resend_confirmation_code<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(async move {
            self.record(
                "resend_confirmation_code",
                format!("resend_confirmation_code:{email}"),
            )
        })
    }

    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, IdentityResult<AuthTokens>> {
        Box::pin(async move {
            self.record("login", format!("login:{email}"))?;
            match self.logins.get(email) {
                Some((expected, access_token, refresh_token)) if expected == password => {
                    Ok(AuthTokens {
                        access_token: access_token.clone(),
                        refresh_token: refresh_token.clone(),
                    })
                }
                _ => Err(IdentityError::InvalidCredentials),
            }
        })
    }

    fn validate_token<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, IdentityResult<TokenOwner>> {
        Box::pin(async move {
            self.record("validate_token", format!("validate_token:{access_token}"))?;
            self.tokens
                .get(access_token)
                .map(|username| TokenOwner {
                    username: username.clone(),
                })
                .ok_or(IdentityError::InvalidOrExpiredToken)
        })
    }

    fn refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<RefreshedToken>> {
        Box::pin(async move {
            self.record(
                "refresh_token",
                format!("refresh_token:{refresh_token}:{email}"),
            )?;
            self.refresh
                .get(refresh_token)
                .map(|access_token| RefreshedToken {
                    access_token: access_token.clone(),
                })
                .ok_or(IdentityError::InvalidOrExpiredRefreshToken)
        })
    }

    fn forgot_password<'a>(&'a self, email: &'a str) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(async move { self.record("forgot_password", format!("forgot_password:{email}")) })
    }

    fn confirm_forgot_password<'a>(
        &'a self,
        code: &'a str,
        _password: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(async move {
            self.record(
                "confirm_forgot_password",
                format!("confirm_forgot_password:{email}:{code}"),
            )
        })
    }

    fn admin_get_user<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, IdentityResult<ProviderUser>> {
        Box::pin(async move {
            self.record("admin_get_user", format!("admin_get_user:{username}"))?;
            self.users
                .get(username)
                .cloned()
                .ok_or(IdentityError::UserNotFound)
        })
    }
}

/// Full application router over test doubles.
pub(crate) fn app(identity: &Arc<FakeIdentity>, store: &MemoryStore) -> axum::Router {
    let identity: SharedIdentity = identity.clone();
    let store: SharedStore = Arc::new(store.clone());
    crate::api::router(identity, store, &ApiConfig::default())
}
