use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::{
    validation::{self, parse_json, Validate},
    PARSE_FORM_ERROR, TOO_MANY_FAILED_ATTEMPTS, TOO_MANY_REQUESTS,
};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        SharedIdentity, SharedStore,
    },
    identity::IdentityError,
    session::{SessionCookies, SessionPayload},
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(ToSchema, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginRequest {
    email: String,
    password: String,
    /// Any non-empty value also returns the access token in the body.
    auth_flow: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("auth_flow", &self.auth_flow)
            .finish_non_exhaustive()
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.email, "Email is required")?;
        validation::required(&self.password, "Password is required")
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    user_id: String,
    first_name: String,
    last_name: String,
    full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

fn login_error(err: IdentityError) -> ApiError {
    match err {
        IdentityError::RateLimited => ApiError::RateLimited(TOO_MANY_REQUESTS.to_string()),
        IdentityError::TooManyFailedAttempts => {
            ApiError::unauthorized(TOO_MANY_FAILED_ATTEMPTS)
        }
        err if err.is_unavailable() => {
            error!("Login failed: {err}");
            ApiError::internal("Something went wrong")
        }
        err => {
            info!("Login rejected: {err}");
            ApiError::unauthorized(INVALID_CREDENTIALS)
        }
    }
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session cookie issued", body = LoginResponse),
        (status = 400, description = "Missing fields or invalid payload", body = ErrorBody),
        (status = 401, description = "Invalid credentials or too many failed attempts", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    Extension(identity): Extension<SharedIdentity>,
    Extension(store): Extension<SharedStore>,
    Extension(cookies): Extension<SessionCookies>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: LoginRequest = parse_json(&body, PARSE_FORM_ERROR)?;
    request.validate()?;
    let email = request.email.trim();

    let tokens = identity
        .login(email, &request.password)
        .await
        .map_err(login_error)?;

    let user = match store.user_by_email(email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!("Authenticated account has no stored user");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
        Err(err) => {
            error!("Error fetching user: {err:#}");
            return Err(ApiError::internal("Something went wrong"));
        }
    };

    let access_token = tokens.access_token;
    let session = SessionPayload::new(
        access_token.clone(),
        tokens.refresh_token,
        user.email.clone(),
        user.user_id.clone(),
    );
    let cookie = cookies.issue(&session).map_err(|err| {
        error!("Failed to issue session cookie: {err}");
        ApiError::internal("An error has occurred while generating auth data")
    })?;

    let mut headers = HeaderMap::new();
    SessionCookies::attach(&mut headers, cookie);

    info!(user_id = %user.user_id, "Login succeeded");

    let response = LoginResponse {
        user_id: user.user_id,
        first_name: user.first_name,
        last_name: user.last_name,
        full_name: user.full_name,
        access_token: (!request.auth_flow.trim().is_empty()).then_some(access_token),
    };

    Ok((StatusCode::OK, headers, Json(response)))
}
