//! Password reset: request a code, then set a new password with it.

use axum::{body::Bytes, extract::Extension, Json};
use serde::Deserialize;
use std::fmt;
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::{
    validation::{self, parse_json, Validate},
    MessageResponse, INTERNAL_ERROR, TOO_MANY_FAILED_ATTEMPTS, TOO_MANY_REQUESTS,
};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        SharedIdentity,
    },
    identity::IdentityError,
};

const PARSE_JSON_ERROR: &str = "Cannot parse JSON data";

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    email: String,
}

impl Validate for ForgotPasswordRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.email, "Email not in request")
    }
}

#[derive(ToSchema, Deserialize, Default)]
#[serde(default)]
pub struct ConfirmForgotPasswordRequest {
    email: String,
    code: String,
    password: String,
}

impl fmt::Debug for ConfirmForgotPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmForgotPasswordRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Validate for ConfirmForgotPasswordRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.code, "Code not in request")?;
        validation::required(&self.password, "Password not in request")?;
        validation::required(&self.email, "Email not in request")
    }
}

fn reset_error(err: IdentityError) -> ApiError {
    match err {
        IdentityError::RateLimited => ApiError::RateLimited(TOO_MANY_REQUESTS.to_string()),
        IdentityError::TooManyFailedAttempts => {
            ApiError::unauthorized(TOO_MANY_FAILED_ATTEMPTS)
        }
        IdentityError::InvalidCode(message) | IdentityError::InvalidInput(message) => {
            ApiError::Validation(message)
        }
        err => {
            error!("Password reset failed: {err}");
            ApiError::internal(INTERNAL_ERROR)
        }
    }
}

#[utoipa::path(
    post,
    path = "/forgotPassword",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 400, description = "Missing email or invalid payload", body = ErrorBody),
        (status = 401, description = "Too many failed attempts", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    Extension(identity): Extension<SharedIdentity>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: ForgotPasswordRequest = parse_json(&body, PARSE_JSON_ERROR)?;
    request.validate()?;

    identity
        .forgot_password(request.email.trim())
        .await
        .map_err(reset_error)?;

    Ok(Json(MessageResponse::new("Password reset code sent")))
}

#[utoipa::path(
    post,
    path = "/confirmForgotPassword",
    request_body = ConfirmForgotPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Missing fields, bad code or weak password", body = ErrorBody),
        (status = 401, description = "Too many failed attempts", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn confirm_forgot_password(
    Extension(identity): Extension<SharedIdentity>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: ConfirmForgotPasswordRequest = parse_json(&body, PARSE_JSON_ERROR)?;
    request.validate()?;

    identity
        .confirm_forgot_password(
            request.code.trim(),
            &request.password,
            request.email.trim(),
        )
        .await
        .map_err(reset_error)?;

    Ok(Json(MessageResponse::new("Password changed successfully")))
}
