//! Request signing for the user pool API.
//!
//! App clients with a secret must send `SECRET_HASH` on every public call.
//! Administrative calls are additionally signed with AWS Signature Version 4.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::fmt::Write;

use super::{config::AwsCredentials, IdentityError};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub(super) const SERVICE: &str = "cognito-idp";
pub(super) const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, IdentityError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| IdentityError::Configuration(format!("invalid HMAC key: {err}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

/// `base64(HMAC-SHA256(client_secret, username + client_id))`
pub(super) fn secret_hash(
    client_secret: &str,
    username: &str,
    client_id: &str,
) -> Result<String, IdentityError> {
    let message = format!("{username}{client_id}");
    let digest = hmac_sha256(client_secret.as_bytes(), message.as_bytes())?;
    Ok(Base64::encode_string(&digest))
}

fn signing_key(
    secret_access_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, IdentityError> {
    let k_date = hmac_sha256(format!("AWS4{secret_access_key}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Headers to add to a signed request.
#[derive(Debug)]
pub(super) struct SignedHeaders {
    pub(super) authorization: String,
    pub(super) amz_date: String,
    pub(super) security_token: Option<String>,
}

/// Inputs for a SigV4 signature over a JSON 1.1 `POST /` request.
pub(super) struct SigningRequest<'a> {
    pub(super) credentials: &'a AwsCredentials,
    pub(super) region: &'a str,
    pub(super) host: &'a str,
    pub(super) target: &'a str,
    pub(super) body: &'a [u8],
}

pub(super) fn sign(
    request: &SigningRequest<'_>,
    now: DateTime<Utc>,
) -> Result<SignedHeaders, IdentityError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let security_token = request
        .credentials
        .session_token
        .as_ref()
        .map(|token| token.expose_secret().to_string());

    // Canonical headers must be sorted by name.
    let mut canonical_headers = format!(
        "content-type:{CONTENT_TYPE}\nhost:{}\nx-amz-date:{amz_date}\n",
        request.host
    );
    let mut signed_headers = String::from("content-type;host;x-amz-date");
    if let Some(token) = &security_token {
        let _ = writeln!(canonical_headers, "x-amz-security-token:{token}");
        signed_headers.push_str(";x-amz-security-token");
    }
    let _ = writeln!(canonical_headers, "x-amz-target:{}", request.target);
    signed_headers.push_str(";x-amz-target");

    let canonical_request = format!(
        "POST\n/\n\n{canonical_headers}\n{signed_headers}\n{}",
        sha256_hex(request.body)
    );
    let scope = format!("{date}/{}/{SERVICE}/aws4_request", request.region);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(
        request.credentials.secret_access_key.expose_secret(),
        &date,
        request.region,
        SERVICE,
    )?;
    let signature = hex(&hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            request.credentials.access_key_id
        ),
        amz_date,
        security_token,
    })
}
