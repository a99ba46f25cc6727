//! Identity provider configuration, built once at startup.

use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// IAM credentials used to sign administrative calls.
#[derive(Clone, Debug)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    user_pool_id: String,
    client_id: String,
    client_secret: SecretString,
    region: Option<String>,
    endpoint: Option<String>,
    credentials: Option<AwsCredentials>,
    timeout: Duration,
}

impl IdentityConfig {
    /// The region defaults to the user pool id prefix (`eu-west-1_AbC123`).
    #[must_use]
    pub fn new(user_pool_id: String, client_id: String, client_secret: SecretString) -> Self {
        let region = user_pool_id
            .split_once('_')
            .map(|(region, _)| region.to_string())
            .filter(|region| !region.is_empty());

        Self {
            user_pool_id,
            client_id,
            client_secret,
            region,
            endpoint: None,
            credentials: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: String) -> Self {
        self.region = Some(region);
        self
    }

    /// Send requests to this URL instead of the regional endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_pool_id(&self) -> &str {
        &self.user_pool_id
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(super) fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&AwsCredentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the URL every call is posted to.
    ///
    /// # Errors
    /// Returns an error if the override is not a valid URL or no region is known.
    pub fn endpoint_url(&self) -> Result<Url> {
        if let Some(endpoint) = &self.endpoint {
            return Url::parse(endpoint)
                .with_context(|| format!("Invalid identity provider endpoint: {endpoint}"));
        }
        let region = self.region.as_deref().ok_or_else(|| {
            anyhow!(
                "Cannot derive AWS region from user pool id {}, set --aws-region",
                self.user_pool_id
            )
        })?;
        Url::parse(&format!("https://cognito-idp.{region}.amazonaws.com/"))
            .context("Failed to build identity provider endpoint")
    }
}
