//! Account registration: sign-up, confirmation, and code resend.
//!
//! The user row is written only after the provider confirms the account, so
//! the database never holds unconfirmed users.

use axum::{body::Bytes, extract::Extension, http::StatusCode, Json};
use serde::Deserialize;
use std::fmt;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::{
    validation::{self, parse_json, Validate},
    MessageResponse, PARSE_FORM_ERROR, TOO_MANY_FAILED_ATTEMPTS, TOO_MANY_REQUESTS,
};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        SharedIdentity, SharedStore,
    },
    identity::{IdentityError, NewAccount},
    storage::{CreateUserOutcome, NewUser},
};

const EMAIL_EXISTS: &str = "Email already exists";
const VERIFY_FAILED: &str = "An error has occurred while verifying your account";
const CREATE_FAILED: &str = "An error has occurred while creating your account";
const RESEND_FAILED: &str = "An error has occurred while resending confirmation code";

#[derive(ToSchema, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct SignupRequest {
    email: String,
    password: String,
    full_name: String,
    first_name: String,
    last_name: String,
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Validate for SignupRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required_all(
            &[
                &self.email,
                &self.password,
                &self.full_name,
                &self.first_name,
                &self.last_name,
            ],
            "All fields (email, password, fullName, firstName, lastName) are required",
        )?;
        validation::email(self.email.trim(), "Invalid email address")
    }
}

impl SignupRequest {
    fn into_account(self) -> NewAccount {
        NewAccount {
            email: self.email.trim().to_string(),
            password: self.password,
            first_name: self.first_name,
            last_name: self.last_name,
            full_name: self.full_name,
        }
    }
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ConfirmSignupRequest {
    email: String,
    code: String,
}

impl Validate for ConfirmSignupRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.code, "Code not in request")?;
        validation::required(&self.email, "Email not in request")
    }
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ResendCodeRequest {
    email: String,
}

impl Validate for ResendCodeRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.email, "Email not in request")
    }
}

#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Pending account registered", body = MessageResponse),
        (status = 400, description = "Missing fields or invalid payload", body = ErrorBody),
        (status = 409, description = "Email already exists", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signup(
    Extension(identity): Extension<SharedIdentity>,
    Extension(store): Extension<SharedStore>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: SignupRequest = parse_json(&body, PARSE_FORM_ERROR)?;
    request.validate()?;

    match store.user_by_email(request.email.trim()).await {
        Ok(Some(_)) => return Err(ApiError::Conflict(EMAIL_EXISTS.to_string())),
        Ok(None) => (),
        Err(err) => {
            error!("Error checking if user exists: {err:#}");
            return Err(ApiError::internal("Something went wrong"));
        }
    }

    let account = request.into_account();
    match identity.sign_up(&account).await {
        Ok(()) => {
            info!("Pending account registered");
            Ok(Json(MessageResponse::new("Sign up successful")))
        }
        Err(IdentityError::AlreadyExists) => Err(ApiError::Conflict(EMAIL_EXISTS.to_string())),
        Err(err) if err.is_unavailable() => {
            error!("Sign up failed: {err}");
            Err(ApiError::internal("Something went wrong"))
        }
        Err(IdentityError::InvalidInput(message)) => Err(ApiError::Validation(message)),
        Err(err) => Err(ApiError::Validation(err.to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/confirmsignup",
    request_body = ConfirmSignupRequest,
    responses(
        (status = 200, description = "Account confirmed and stored", body = MessageResponse),
        (status = 400, description = "Missing fields or rejected code", body = ErrorBody),
        (status = 409, description = "Account already stored", body = ErrorBody),
        (status = 500, description = "Provider or database failure", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn confirm_signup(
    Extension(identity): Extension<SharedIdentity>,
    Extension(store): Extension<SharedStore>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: ConfirmSignupRequest = parse_json(&body, PARSE_FORM_ERROR)?;
    request.validate()?;
    let email = request.email.trim();

    if let Err(err) = identity.confirm_sign_up(email, request.code.trim()).await {
        if err.is_unavailable() {
            error!("Confirm sign up failed: {err}");
            return Err(ApiError::internal(VERIFY_FAILED));
        }
        return Err(ApiError::Validation(err.to_string()));
    }

    let profile = match identity.admin_get_user(email).await {
        Ok(profile) => profile,
        Err(err) => {
            error!("Failed to fetch confirmed user: {err}");
            return Err(ApiError::internal(VERIFY_FAILED));
        }
    };

    let user = NewUser {
        user_id: profile.username,
        email: email.to_string(),
        first_name: profile.given_name.unwrap_or_default(),
        last_name: profile.family_name.unwrap_or_default(),
        full_name: profile.name.unwrap_or_default(),
    };

    match store.create_user(&user).await {
        Ok(CreateUserOutcome::Created) => {
            info!(user_id = %user.user_id, "Account confirmed");
            Ok(Json(MessageResponse::new("Sign up successful")))
        }
        Ok(CreateUserOutcome::Conflict) => {
            Err(ApiError::Conflict("Account already exists".to_string()))
        }
        Err(err) => {
            error!("Error inserting user: {err:#}");
            Err(ApiError::internal(CREATE_FAILED))
        }
    }
}

#[utoipa::path(
    post,
    path = "/resendConfirmationCode",
    request_body = ResendCodeRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Missing email", body = ErrorBody),
        (status = 401, description = "Too many failed attempts", body = ErrorBody),
        (status = 403, description = "Provider refused to resend", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn resend_confirmation_code(
    Extension(identity): Extension<SharedIdentity>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let request: ResendCodeRequest = parse_json(&body, PARSE_FORM_ERROR)?;
    request.validate()?;

    match identity.resend_confirmation_code(request.email.trim()).await {
        Ok(()) => Ok(Json(MessageResponse::new("Code sent successfully"))),
        Err(IdentityError::RateLimited) => {
            Err(ApiError::RateLimited(TOO_MANY_REQUESTS.to_string()))
        }
        Err(IdentityError::TooManyFailedAttempts) => Err(ApiError::Policy {
            status: StatusCode::UNAUTHORIZED,
            message: TOO_MANY_FAILED_ATTEMPTS.to_string(),
        }),
        Err(err) => {
            error!("Resend confirmation code failed: {err}");
            Err(ApiError::Policy {
                status: StatusCode::FORBIDDEN,
                message: RESEND_FAILED.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::test_support::{app, FakeIdentity},
        identity::ProviderUser,
        storage::memory::MemoryStore,
    };
    use anyhow::Result;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post(
        identity: &std::sync::Arc<FakeIdentity>,
        store: &MemoryStore,
        uri: &str,
        payload: &str,
    ) -> Result<(StatusCode, Value)> {
        let response = app(identity, store)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))?,
            )
            .await?;
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }

    fn signup_body(email: &str) -> String {
        json!({
            "email": email,
            "password": "Secret123!",
            "fullName": "Alice Liddell",
            "firstName": "Alice",
            "lastName": "Liddell"
        })
        .to_string()
    }

    #[tokio::test]
    async fn signup_registers_pending_account() -> Result<()> {
        let identity = FakeIdentity::new().shared();
        let store = MemoryStore::default();
        let (status, body) = post(&identity, &store, "/signup", &signup_body("alice@example.com")).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Sign up successful"}));
        assert_eq!(identity.calls(), vec!["sign_up:alice@example.com"]);
        assert!(store.users().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn signup_with_stored_email_conflicts_without_provider_call() -> Result<()> {
        let identity = FakeIdentity::new().shared();
        let store = MemoryStore::default().with_user("alice", "alice@example.com");
        let (status, body) = post(&identity, &store, "/signup", &signup_body("alice@example.com")).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Email already exists");
        assert!(identity.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn signup_provider_conflict_is_409() -> Result<()> {
        let identity = FakeIdentity::new()
            .failing("sign_up", || IdentityError::AlreadyExists)
            .shared();
        let (status, _) = post(&identity, &MemoryStore::default(), "/signup", &signup_body("a@example.com")).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        Ok(())
    }

    #[tokio::test]
    async fn signup_validation_errors() -> Result<()> {
        let identity = FakeIdentity::new().shared();
        let store = MemoryStore::default();

        let (status, body) = post(&identity, &store, "/signup", r#"{"email":"a@example.com"}"#).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "All fields (email, password, fullName, firstName, lastName) are required"
        );

        let (status, body) = post(&identity, &store, "/signup", "not json").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Cannot parse form data");

        let (status, body) = post(&identity, &store, "/signup", &signup_body("not-an-email")).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid email address");

        assert!(identity.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn confirm_signup_stores_user_from_provider_profile() -> Result<()> {
        let identity = FakeIdentity::new()
            .with_user(ProviderUser {
                username: "alice-sub".to_string(),
                email: Some("alice@example.com".to_string()),
                given_name: Some("Alice".to_string()),
                family_name: Some("Liddell".to_string()),
                name: Some("Alice Liddell".to_string()),
                picture: None,
            })
            .shared();
        let store = MemoryStore::default();
        let (status, body) = post(
            &identity,
            &store,
            "/confirmsignup",
            r#"{"email":"alice@example.com","code":"123456"}"#,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Sign up successful");

        let users = store.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "alice-sub");
        assert_eq!(users[0].full_name, "Alice Liddell");
        assert_eq!(
            identity.calls(),
            vec![
                "confirm_sign_up:alice@example.com:123456",
                "admin_get_user:alice@example.com"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn confirm_signup_failures() -> Result<()> {
        let store = MemoryStore::default();

        let identity = FakeIdentity::new().shared();
        let (status, body) = post(&identity, &store, "/confirmsignup", r#"{"email":"a@example.com"}"#).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Code not in request");

        let (status, body) = post(&identity, &store, "/confirmsignup", r#"{"code":"1"}"#).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email not in request");

        let identity = FakeIdentity::new()
            .failing("confirm_sign_up", || {
                IdentityError::InvalidCode("Invalid verification code provided".to_string())
            })
            .shared();
        let (status, body) = post(&identity, &store, "/confirmsignup", r#"{"email":"a@example.com","code":"1"}"#).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid verification code provided");

        // Confirmed upstream but the profile lookup failed.
        let identity = FakeIdentity::new().shared();
        let (status, body) = post(&identity, &store, "/confirmsignup", r#"{"email":"a@example.com","code":"1"}"#).await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], VERIFY_FAILED);
        assert!(store.users().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn confirm_signup_store_failure_is_500() -> Result<()> {
        let identity = FakeIdentity::new()
            .with_user(ProviderUser {
                username: "alice".to_string(),
                email: Some("alice@example.com".to_string()),
                ..ProviderUser::default()
            })
            .shared();
        let (status, body) = post(
            &identity,
            &MemoryStore::unavailable(),
            "/confirmsignup",
            r#"{"email":"alice@example.com","code":"1"}"#,
        )
        .await?;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], CREATE_FAILED);
        Ok(())
    }

    #[tokio::test]
    async fn resend_code_maps_provider_errors() -> Result<()> {
        let store = MemoryStore::default();
        let payload = r#"{"email":"alice@example.com"}"#;

        let identity = FakeIdentity::new().shared();
        let (status, body) = post(&identity, &store, "/resendConfirmationCode", payload).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Code sent successfully");

        let identity = FakeIdentity::new()
            .failing("resend_confirmation_code", || IdentityError::RateLimited)
            .shared();
        let (status, body) = post(&identity, &store, "/resendConfirmationCode", payload).await?;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Too Many Requests");

        let identity = FakeIdentity::new()
            .failing("resend_confirmation_code", || IdentityError::TooManyFailedAttempts)
            .shared();
        let (status, body) = post(&identity, &store, "/resendConfirmationCode", payload).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Too Many Failed Attempts");

        let identity = FakeIdentity::new()
            .failing("resend_confirmation_code", || IdentityError::UserNotFound)
            .shared();
        let (status, body) = post(&identity, &store, "/resendConfirmationCode", payload).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], RESEND_FAILED);

        let (status, body) = post(&identity, &store, "/resendConfirmationCode", "{}").await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email not in request");
        Ok(())
    }
}
