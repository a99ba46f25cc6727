use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use utoipa::ToSchema;

use super::INTERNAL_ERROR;
use crate::api::{error::ApiError, error::ErrorBody, middleware::CurrentUser, SharedStore};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    email: String,
    first_name: String,
    last_name: String,
    full_name: String,
    /// Empty when the user never uploaded a picture.
    #[serde(rename = "profilePictureURL")]
    profile_picture_url: String,
}

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Stored profile of the caller", body = Profile),
        (status = 401, description = "Missing or invalid credentials", body = ErrorBody),
        (status = 404, description = "No stored user for the caller", body = ErrorBody)
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag = "profile"
)]
#[instrument(skip_all, fields(username = %user.username))]
pub async fn profile(
    Extension(user): Extension<CurrentUser>,
    Extension(store): Extension<SharedStore>,
) -> Result<Json<Profile>, ApiError> {
    let stored = store
        .user_by_id(&user.username)
        .await
        .map_err(|err| {
            error!("Error fetching profile: {err:#}");
            ApiError::internal(INTERNAL_ERROR)
        })?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(Profile {
        email: stored.email,
        first_name: stored.first_name,
        last_name: stored.last_name,
        full_name: stored.full_name,
        profile_picture_url: stored.profile_url.unwrap_or_default(),
    }))
}
