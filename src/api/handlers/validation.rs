//! Request validation shared by every handler.
//!
//! Each request type declares its rules in [`Validate::validate`]; rules run
//! in declaration order and the first failure becomes the `400` message.

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;

pub trait Validate {
    /// # Errors
    /// Returns [`ApiError::Validation`] naming the first rule that failed.
    fn validate(&self) -> Result<(), ApiError>;
}

/// Decode a JSON body regardless of its declared content type.
pub fn parse_json<T: DeserializeOwned>(body: &[u8], message: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::validation(message))
}

pub fn required(value: &str, message: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::validation(message))
    } else {
        Ok(())
    }
}

/// All values must be non-empty; one message covers the group.
pub fn required_all(values: &[&str], message: &str) -> Result<(), ApiError> {
    if values.iter().any(|value| value.trim().is_empty()) {
        Err(ApiError::validation(message))
    } else {
        Ok(())
    }
}

pub fn present<T>(value: Option<&T>, message: &str) -> Result<(), ApiError> {
    value.map(|_| ()).ok_or_else(|| ApiError::validation(message))
}

/// Strictly greater than zero and finite.
pub fn positive(value: f64, message: &str) -> Result<(), ApiError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ApiError::validation(message))
    }
}

pub fn email(value: &str, message: &str) -> Result<(), ApiError> {
    if valid_email(value) {
        Ok(())
    } else {
        Err(ApiError::validation(message))
    }
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}
