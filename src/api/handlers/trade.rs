//! Trade submission.
//!
//! Clients must declare `application/x-www-form-urlencoded`. The body itself
//! is read as JSON when it looks like an object and as a URL-encoded form
//! otherwise, since existing clients send JSON under the form content type.

use axum::{
    body::Bytes,
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::validation::{self, Validate};
use crate::{
    api::{
        error::{ApiError, ErrorBody},
        middleware::CurrentUser,
        SharedStore,
    },
    storage::NewTrade,
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const PARSE_PAYLOAD_ERROR: &str = "Cannot parse request payload";

/// `0001-01-01T00:00:00Z`, sent by clients for an unset timestamp.
const UNSET_INSTANT_SECONDS: i64 = -62_135_596_800;

#[derive(ToSchema, Deserialize, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TradeRequest {
    #[serde(deserialize_with = "null_as_default")]
    asset: String,
    open_position_at: Option<DateTime<Utc>>,
    close_position_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "null_as_default")]
    margin: f64,
    #[serde(deserialize_with = "null_as_default")]
    open_price: f64,
    #[serde(deserialize_with = "null_as_default")]
    close_price: f64,
}

/// `null` reads as the zero value so validation reports the field by name.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_set(at: &DateTime<Utc>) -> bool {
    !(at.timestamp() == UNSET_INSTANT_SECONDS && at.timestamp_subsec_nanos() == 0)
}

impl Validate for TradeRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validation::required(&self.asset, "Asset is required")?;
        validation::present(
            self.open_position_at.as_ref().filter(|at| is_set(at)),
            "OpenPositionAt is required",
        )?;
        validation::present(
            self.close_position_at.as_ref().filter(|at| is_set(at)),
            "ClosePositionAt is required",
        )?;
        validation::positive(self.margin, "Margin must be greater than 0")?;
        validation::positive(self.open_price, "OpenPrice must be greater than 0")?;
        validation::positive(self.close_price, "ClosePrice must be greater than 0")
    }
}

impl TradeRequest {
    fn from_form(body: &[u8]) -> Result<Self, ApiError> {
        let invalid = || ApiError::validation(PARSE_PAYLOAD_ERROR);
        let number = |value: &str| value.trim().parse::<f64>().map_err(|_| invalid());
        let timestamp = |value: &str| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|at| at.with_timezone(&Utc))
                .map_err(|_| invalid())
        };

        let mut request = Self::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "asset" => request.asset = value.into_owned(),
                "openPositionAt" => request.open_position_at = Some(timestamp(&value)?),
                "closePositionAt" => request.close_position_at = Some(timestamp(&value)?),
                "margin" => request.margin = number(&value)?,
                "openPrice" => request.open_price = number(&value)?,
                "closePrice" => request.close_price = number(&value)?,
                _ => (),
            }
        }
        Ok(request)
    }

    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.trim_ascii_start().starts_with(b"{") {
            validation::parse_json(body, PARSE_PAYLOAD_ERROR)
        } else {
            Self::from_form(body)
        }
    }

    fn into_trade(self, user_id: String) -> Result<NewTrade, ApiError> {
        let (Some(open_position_at), Some(close_position_at)) =
            (self.open_position_at, self.close_position_at)
        else {
            return Err(ApiError::validation("OpenPositionAt is required"));
        };

        Ok(NewTrade {
            trade_id: Uuid::new_v4(),
            user_id,
            asset: self.asset.trim().to_string(),
            open_position_at,
            close_position_at,
            margin: self.margin,
            open_price: self.open_price,
            close_price: self.close_price,
        })
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TradeCreated {
    pub id: Uuid,
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_TYPE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .any(|essence| essence.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

#[utoipa::path(
    post,
    path = "/trade",
    request_body(content = TradeRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 201, description = "Trade recorded", body = TradeCreated),
        (status = 400, description = "Unsupported content type or invalid trade", body = ErrorBody),
        (status = 401, description = "Missing or invalid credentials", body = ErrorBody)
    ),
    security(("bearer" = []), ("cookie" = [])),
    tag = "trade"
)]
#[instrument(skip_all, fields(username = %user.username))]
pub async fn add_trade(
    Extension(user): Extension<CurrentUser>,
    Extension(store): Extension<SharedStore>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<TradeCreated>), ApiError> {
    if !is_form(&headers) {
        return Err(ApiError::validation("Unsupported content type"));
    }

    let request = TradeRequest::parse(&body)?;
    request.validate()?;
    let trade = request.into_trade(user.username)?;

    if let Err(err) = store.create_trade(&trade).await {
        error!("Error inserting trade: {err:#}");
        return Err(ApiError::internal("An error occurred while adding the trade"));
    }

    info!(trade_id = %trade.trade_id, asset = %trade.asset, "Trade recorded");

    Ok((StatusCode::CREATED, Json(TradeCreated { id: trade.trade_id })))
}
