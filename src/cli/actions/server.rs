use crate::{
    api::{self, ApiConfig, SharedIdentity, SharedStore},
    cli::commands::identity::Options as IdentityOptions,
    identity::{AwsCredentials, CognitoClient, IdentityConfig},
    session::SessionCookies,
    storage::PgStore,
};
use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub request_timeout_seconds: u64,
    pub cors_allowed_origin: String,
    pub cookie_secure: bool,
    pub identity: IdentityOptions,
}

/// Account confirmation reads the new user with a signed administrative call,
/// so startup fails without IAM credentials.
fn identity_config(options: IdentityOptions) -> Result<IdentityConfig> {
    let (Some(access_key_id), Some(secret_access_key)) =
        (options.access_key_id, options.secret_access_key)
    else {
        bail!("AWS credentials are required: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY");
    };

    let mut config = IdentityConfig::new(
        options.user_pool_id,
        options.client_id,
        options.client_secret,
    )
    .with_timeout(Duration::from_secs(options.timeout_seconds))
    .with_credentials(AwsCredentials {
        access_key_id,
        secret_access_key,
        session_token: options.session_token,
    });

    if let Some(region) = options.region {
        config = config.with_region(region);
    }
    if let Some(endpoint) = options.endpoint {
        config = config.with_endpoint(endpoint);
    }

    Ok(config)
}

/// Execute the server action.
/// # Errors
/// Returns an error if configuration is invalid, the database is unreachable, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let config = identity_config(args.identity)?;
    debug!(
        user_pool_id = config.user_pool_id(),
        region = config.region().unwrap_or("unknown"),
        "Identity provider configured"
    );
    let identity: SharedIdentity =
        Arc::new(CognitoClient::new(config).context("Failed to build identity client")?);

    let store = PgStore::connect(args.dsn.expose_secret()).await?;
    store.migrate().await?;
    info!("Database schema ready");
    let store: SharedStore = Arc::new(store);

    let api_config = ApiConfig {
        cors: api::middleware::CorsConfig::new(&args.cors_allowed_origin)?,
        cookies: SessionCookies::new(args.cookie_secure),
        request_timeout: Duration::from_secs(args.request_timeout_seconds),
    };

    api::new(args.port, store, identity, api_config).await
}
