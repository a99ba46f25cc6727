use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::{error::ErrorBody, middleware::CurrentUser};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Whoami {
    pub username: String,
}

/// Report the username the session resolves to.
#[utoipa::path(
    get,
    path = "/auth",
    responses(
        (status = 200, description = "Authenticated caller", body = Whoami),
        (status = 401, description = "Missing or invalid credentials", body = ErrorBody)
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag = "auth"
)]
#[instrument(skip_all, fields(username = %user.username))]
pub async fn whoami(Extension(user): Extension<CurrentUser>) -> Json<Whoami> {
    Json(Whoami {
        username: user.username,
    })
}
