//! Cognito user pool client speaking the AWS JSON 1.1 protocol.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    StatusCode,
};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info_span, Instrument};
use url::Url;

use super::{
    config::IdentityConfig,
    signing::{self, SigningRequest},
    AuthTokens, BoxFuture, IdentityError, IdentityProvider, IdentityResult, NewAccount,
    ProviderUser, RefreshedToken, TokenOwner,
};
use crate::APP_USER_AGENT;

const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    SignUp,
    ConfirmSignUp,
    ResendConfirmationCode,
    Login,
    Refresh,
    GetUser,
    ForgotPassword,
    ConfirmForgotPassword,
    AdminGetUser,
}

impl Operation {
    fn action(self) -> &'static str {
        match self {
            Self::SignUp => "SignUp",
            Self::ConfirmSignUp => "ConfirmSignUp",
            Self::ResendConfirmationCode => "ResendConfirmationCode",
            Self::Login | Self::Refresh => "InitiateAuth",
            Self::GetUser => "GetUser",
            Self::ForgotPassword => "ForgotPassword",
            Self::ConfirmForgotPassword => "ConfirmForgotPassword",
            Self::AdminGetUser => "AdminGetUser",
        }
    }

    /// Administrative actions are authorized with IAM credentials.
    fn is_admin(self) -> bool {
        matches!(self, Self::AdminGetUser)
    }

    /// Error reported for `NotAuthorizedException` and `UserNotFoundException`.
    fn unauthorized(self, message: String) -> IdentityError {
        match self {
            Self::Login => IdentityError::InvalidCredentials,
            Self::GetUser => IdentityError::InvalidOrExpiredToken,
            Self::Refresh => IdentityError::InvalidOrExpiredRefreshToken,
            Self::AdminGetUser => IdentityError::UserNotFound,
            _ => IdentityError::InvalidInput(message),
        }
    }
}

/// Translate a remote error type into the typed taxonomy.
fn map_fault(operation: Operation, kind: &str, message: String) -> IdentityError {
    match kind {
        "UsernameExistsException" | "AliasExistsException" => IdentityError::AlreadyExists,
        "InvalidParameterException" | "InvalidPasswordException" => {
            IdentityError::InvalidInput(message)
        }
        "CodeMismatchException" | "ExpiredCodeException" => IdentityError::InvalidCode(message),
        "TooManyRequestsException" | "LimitExceededException" => IdentityError::RateLimited,
        "TooManyFailedAttemptsException" => IdentityError::TooManyFailedAttempts,
        "UserNotConfirmedException" => IdentityError::NotConfirmed,
        "NotAuthorizedException" | "UserNotFoundException" => operation.unauthorized(message),
        _ => IdentityError::Service {
            kind: kind.to_string(),
            message,
        },
    }
}

/// Unrecognized faults answered with a 5xx status are outages, not rejections.
fn server_fault(status: StatusCode, err: IdentityError) -> IdentityError {
    match err {
        IdentityError::Service { kind, message } if status.is_server_error() => {
            IdentityError::ServerFault { kind, message }
        }
        err => err,
    }
}

/// `com.amazonaws.cognito#NotAuthorizedException` and
/// `NotAuthorizedException:http://internal.amazon.com/` both name `NotAuthorizedException`.
fn short_error_kind(raw: &str) -> &str {
    let kind = raw.rsplit_once('#').map_or(raw, |(_, kind)| kind);
    kind.split_once(':').map_or(kind, |(kind, _)| kind).trim()
}

#[derive(Debug, Default, Deserialize)]
struct Fault {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Attribute<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SignUpRequest<'a> {
    client_id: &'a str,
    secret_hash: String,
    username: &'a str,
    password: &'a str,
    user_attributes: Vec<Attribute<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConfirmSignUpRequest<'a> {
    client_id: &'a str,
    secret_hash: String,
    username: &'a str,
    confirmation_code: &'a str,
}

/// Shared by `ResendConfirmationCode` and `ForgotPassword`.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct UsernameRequest<'a> {
    client_id: &'a str,
    secret_hash: String,
    username: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConfirmForgotPasswordRequest<'a> {
    client_id: &'a str,
    secret_hash: String,
    username: &'a str,
    confirmation_code: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'static str,
    client_id: &'a str,
    auth_parameters: BTreeMap<&'static str, &'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserRequest<'a> {
    access_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AdminGetUserRequest<'a> {
    user_pool_id: &'a str,
    username: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserResponse {
    username: String,
    #[serde(default)]
    user_attributes: Vec<UserAttribute>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserAttribute {
    name: String,
    value: Option<String>,
}

impl From<UserResponse> for ProviderUser {
    fn from(response: UserResponse) -> Self {
        let mut user = Self {
            username: response.username,
            ..Self::default()
        };
        for attribute in response.user_attributes {
            let slot = match attribute.name.as_str() {
                "email" => &mut user.email,
                "given_name" => &mut user.given_name,
                "family_name" => &mut user.family_name,
                "name" => &mut user.name,
                "picture" => &mut user.picture,
                _ => continue,
            };
            *slot = attribute.value;
        }
        user
    }
}

/// Production [`IdentityProvider`] backed by a Cognito user pool.
#[derive(Clone, Debug)]
pub struct CognitoClient {
    config: IdentityConfig,
    endpoint: Url,
    client: reqwest::Client,
}

impl CognitoClient {
    /// Build the HTTP client and resolve the endpoint.
    ///
    /// # Errors
    /// Returns an error if the endpoint cannot be resolved or the HTTP client cannot be built.
    pub fn new(config: IdentityConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout())
            .build()
            .context("Failed to build identity provider HTTP client")?;

        Ok(Self {
            config,
            endpoint,
            client,
        })
    }

    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    fn secret_hash(&self, username: &str) -> IdentityResult<String> {
        signing::secret_hash(
            self.config.client_secret().expose_secret(),
            username,
            self.config.client_id(),
        )
    }

    fn host(&self) -> IdentityResult<String> {
        let host = self.endpoint.host_str().ok_or_else(|| {
            IdentityError::Configuration(format!("endpoint has no host: {}", self.endpoint))
        })?;
        Ok(self
            .endpoint
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}")))
    }

    async fn call<B, R>(&self, operation: Operation, body: &B) -> IdentityResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let target = format!("{TARGET_PREFIX}.{}", operation.action());
        let span = info_span!(
            "identity.call",
            rpc.system = "aws-api",
            rpc.service = "CognitoIdentityProvider",
            rpc.method = operation.action(),
        );

        async {
            let payload = serde_json::to_vec(body)
                .map_err(|err| IdentityError::Protocol(format!("cannot encode request: {err}")))?;

            let mut request = self
                .client
                .post(self.endpoint.clone())
                .header(CONTENT_TYPE, HeaderValue::from_static(signing::CONTENT_TYPE))
                .header("X-Amz-Target", target.as_str());

            if operation.is_admin() {
                let credentials = self.config.credentials().ok_or_else(|| {
                    IdentityError::Configuration(
                        "AWS credentials are required for administrative calls".to_string(),
                    )
                })?;
                let region = self.config.region().ok_or_else(|| {
                    IdentityError::Configuration("AWS region is not configured".to_string())
                })?;
                let host = self.host()?;
                let signed = signing::sign(
                    &SigningRequest {
                        credentials,
                        region,
                        host: &host,
                        target: &target,
                        body: &payload,
                    },
                    Utc::now(),
                )?;
                request = request
                    .header(AUTHORIZATION, signed.authorization)
                    .header("X-Amz-Date", signed.amz_date);
                if let Some(token) = signed.security_token {
                    request = request.header("X-Amz-Security-Token", token);
                }
            }

            let response = request.body(payload).send().await?;
            let status = response.status();
            let header_kind = response
                .headers()
                .get("x-amzn-errortype")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await?;

            if status.is_success() {
                let bytes: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
                return serde_json::from_slice(bytes).map_err(|err| {
                    IdentityError::Protocol(format!("cannot decode {}: {err}", operation.action()))
                });
            }

            let fault: Fault = serde_json::from_slice(&bytes).unwrap_or_default();
            let kind = fault
                .kind
                .as_deref()
                .or(header_kind.as_deref())
                .map(short_error_kind)
                .unwrap_or_default()
                .to_string();
            let message = fault
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or_default().to_string());

            debug!(status = status.as_u16(), kind = %kind, "identity provider rejected request");

            if kind.is_empty() {
                return Err(IdentityError::Protocol(format!(
                    "{} failed with status {status}",
                    operation.action()
                )));
            }

            Err(server_fault(status, map_fault(operation, &kind, message)))
        }
        .instrument(span)
        .await
    }

    async fn sign_up_inner(&self, account: &NewAccount) -> IdentityResult<()> {
        let request = SignUpRequest {
            client_id: self.config.client_id(),
            secret_hash: self.secret_hash(&account.email)?,
            username: &account.email,
            password: &account.password,
            user_attributes: vec![
                Attribute {
                    name: "given_name",
                    value: &account.first_name,
                },
                Attribute {
                    name: "family_name",
                    value: &account.last_name,
                },
                Attribute {
                    name: "name",
                    value: &account.full_name,
                },
            ],
        };
        self.call::<_, IgnoredAny>(Operation::SignUp, &request)
            .await
            .map(drop)
    }

    async fn confirm_sign_up_inner(&self, email: &str, code: &str) -> IdentityResult<()> {
        let request = ConfirmSignUpRequest {
            client_id: self.config.client_id(),
            secret_hash: self.secret_hash(email)?,
            username: email,
            confirmation_code: code,
        };
        self.call::<_, IgnoredAny>(Operation::ConfirmSignUp, &request)
            .await
            .map(drop)
    }

    async fn username_call(&self, operation: Operation, email: &str) -> IdentityResult<()> {
        let request = UsernameRequest {
            client_id: self.config.client_id(),
            secret_hash: self.secret_hash(email)?,
            username: email,
        };
        self.call::<_, IgnoredAny>(operation, &request)
            .await
            .map(drop)
    }

    async fn initiate_auth(
        &self,
        operation: Operation,
        auth_flow: &'static str,
        parameters: BTreeMap<&'static str, &str>,
    ) -> IdentityResult<AuthenticationResult> {
        let request = InitiateAuthRequest {
            auth_flow,
            client_id: self.config.client_id(),
            auth_parameters: parameters,
        };
        let response: InitiateAuthResponse = self.call(operation, &request).await?;

        match (response.authentication_result, response.challenge_name) {
            (Some(result), _) => Ok(result),
            (None, Some(challenge)) => Err(IdentityError::ChallengeRequired(challenge)),
            (None, None) => Err(IdentityError::Protocol(
                "InitiateAuth returned neither tokens nor a challenge".to_string(),
            )),
        }
    }

    async fn login_inner(&self, email: &str, password: &str) -> IdentityResult<AuthTokens> {
        let secret_hash = self.secret_hash(email)?;
        let parameters = BTreeMap::from([
            ("USERNAME", email),
            ("PASSWORD", password),
            ("SECRET_HASH", secret_hash.as_str()),
        ]);
        let result = self
            .initiate_auth(Operation::Login, "USER_PASSWORD_AUTH", parameters)
            .await?;

        match (result.access_token, result.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Ok(AuthTokens {
                access_token,
                refresh_token,
            }),
            _ => Err(IdentityError::Protocol(
                "login response is missing tokens".to_string(),
            )),
        }
    }

    async fn refresh_token_inner(
        &self,
        refresh_token: &str,
        email: &str,
    ) -> IdentityResult<RefreshedToken> {
        let secret_hash = self.secret_hash(email)?;
        let parameters = BTreeMap::from([
            ("REFRESH_TOKEN", refresh_token),
            ("SECRET_HASH", secret_hash.as_str()),
        ]);
        let result = self
            .initiate_auth(Operation::Refresh, "REFRESH_TOKEN_AUTH", parameters)
            .await?;

        result
            .access_token
            .map(|access_token| RefreshedToken { access_token })
            .ok_or_else(|| {
                IdentityError::Protocol("refresh response is missing the access token".to_string())
            })
    }

    async fn validate_token_inner(&self, access_token: &str) -> IdentityResult<TokenOwner> {
        let response: UserResponse = self
            .call(Operation::GetUser, &GetUserRequest { access_token })
            .await?;
        Ok(TokenOwner {
            username: response.username,
        })
    }

    async fn confirm_forgot_password_inner(
        &self,
        code: &str,
        password: &str,
        email: &str,
    ) -> IdentityResult<()> {
        let request = ConfirmForgotPasswordRequest {
            client_id: self.config.client_id(),
            secret_hash: self.secret_hash(email)?,
            username: email,
            confirmation_code: code,
            password,
        };
        self.call::<_, IgnoredAny>(Operation::ConfirmForgotPassword, &request)
            .await
            .map(drop)
    }

    async fn admin_get_user_inner(&self, username: &str) -> IdentityResult<ProviderUser> {
        let request = AdminGetUserRequest {
            user_pool_id: self.config.user_pool_id(),
            username,
        };
        let response: UserResponse = self.call(Operation::AdminGetUser, &request).await?;
        Ok(response.into())
    }
}

impl IdentityProvider for CognitoClient {
    fn sign_up<'a>(&'a self, account: &'a NewAccount) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(self.sign_up_inner(account))
    }

    fn confirm_sign_up<'a>(
        &'a self,
        email: &'a str,
        code: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(self.confirm_sign_up_inner(email, code))
    }

    fn resend_confirmation_code<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(self.username_call(Operation::ResendConfirmationCode, email))
    }

    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, IdentityResult<AuthTokens>> {
        Box::pin(self.login_inner(email, password))
    }

    fn validate_token<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, IdentityResult<TokenOwner>> {
        Box::pin(self.validate_token_inner(access_token))
    }

    fn refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<RefreshedToken>> {
        Box::pin(self.refresh_token_inner(refresh_token, email))
    }

    fn forgot_password<'a>(&'a self, email: &'a str) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(self.username_call(Operation::ForgotPassword, email))
    }

    fn confirm_forgot_password<'a>(
        &'a self,
        code: &'a str,
        password: &'a str,
        email: &'a str,
    ) -> BoxFuture<'a, IdentityResult<()>> {
        Box::pin(self.confirm_forgot_password_inner(code, password, email))
    }

    fn admin_get_user<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, IdentityResult<ProviderUser>> {
        Box::pin(self.admin_get_user_inner(username))
    }
}
