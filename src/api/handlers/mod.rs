//! Route handlers.
//!
//! Handlers decode their own bodies, run the shared [`validation`] rules and
//! translate identity and storage failures into
//! [`ApiError`](crate::api::error::ApiError) locally.

pub mod auth;
pub mod health;
pub mod login;
pub mod password;
pub mod profile;
pub mod root;
pub mod signup;
pub mod trade;
pub mod validation;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub(crate) const PARSE_FORM_ERROR: &str = "Cannot parse form data";
pub(crate) const TOO_MANY_REQUESTS: &str = "Too Many Requests";
pub(crate) const TOO_MANY_FAILED_ATTEMPTS: &str = "Too Many Failed Attempts";
pub(crate) const INTERNAL_ERROR: &str = "Internal Server Error";

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
