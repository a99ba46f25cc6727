use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_USER_POOL_ID: &str = "cognito-user-pool-id";
pub const ARG_CLIENT_ID: &str = "cognito-client-id";
pub const ARG_CLIENT_SECRET: &str = "cognito-client-secret";
pub const ARG_ENDPOINT: &str = "cognito-endpoint";
pub const ARG_REGION: &str = "aws-region";
pub const ARG_ACCESS_KEY_ID: &str = "aws-access-key-id";
pub const ARG_SECRET_ACCESS_KEY: &str = "aws-secret-access-key";
pub const ARG_SESSION_TOKEN: &str = "aws-session-token";
pub const ARG_PROVIDER_TIMEOUT: &str = "provider-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_pool_args(command);
    with_aws_args(command)
}

fn with_pool_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_USER_POOL_ID)
                .long(ARG_USER_POOL_ID)
                .help("Cognito user pool id, example: eu-west-1_AbC123")
                .env("COGNITO_USER_POOL_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("Cognito app client id")
                .env("COGNITO_APP_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CLIENT_SECRET)
                .long(ARG_CLIENT_SECRET)
                .help("Cognito app client secret")
                .env("COGNITO_APP_CLIENT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ENDPOINT)
                .long(ARG_ENDPOINT)
                .help("Override the Cognito endpoint, for local emulators")
                .env("COGNITO_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_PROVIDER_TIMEOUT)
                .long(ARG_PROVIDER_TIMEOUT)
                .help("Timeout for each identity provider call")
                .env("TRADELOG_PROVIDER_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_aws_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REGION)
                .long(ARG_REGION)
                .help("AWS region (default: user pool id prefix)")
                .env("AWS_REGION"),
        )
        .arg(
            Arg::new(ARG_ACCESS_KEY_ID)
                .long(ARG_ACCESS_KEY_ID)
                .help("IAM access key used for administrative calls")
                .env("AWS_ACCESS_KEY_ID")
                .requires(ARG_SECRET_ACCESS_KEY),
        )
        .arg(
            Arg::new(ARG_SECRET_ACCESS_KEY)
                .long(ARG_SECRET_ACCESS_KEY)
                .help("IAM secret access key")
                .env("AWS_SECRET_ACCESS_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TOKEN)
                .long(ARG_SESSION_TOKEN)
                .help("Temporary session token for the IAM credentials")
                .env("AWS_SESSION_TOKEN")
                .hide_env_values(true),
        )
}

/// Identity provider settings as given on the command line.
#[derive(Debug)]
pub struct Options {
    pub user_pool_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<SecretString>,
    pub session_token: Option<SecretString>,
    pub timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let required = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };
        let optional = |id: &str| matches.get_one::<String>(id).cloned();

        Ok(Self {
            user_pool_id: required(ARG_USER_POOL_ID)?,
            client_id: required(ARG_CLIENT_ID)?,
            client_secret: SecretString::from(required(ARG_CLIENT_SECRET)?),
            endpoint: optional(ARG_ENDPOINT),
            region: optional(ARG_REGION),
            access_key_id: optional(ARG_ACCESS_KEY_ID),
            secret_access_key: optional(ARG_SECRET_ACCESS_KEY).map(SecretString::from),
            session_token: optional(ARG_SESSION_TOKEN).map(SecretString::from),
            timeout_seconds: matches
                .get_one::<u64>(ARG_PROVIDER_TIMEOUT)
                .copied()
                .unwrap_or(10),
        })
    }
}
