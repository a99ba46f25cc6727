//! Map parsed arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    identity, ARG_COOKIE_SECURE, ARG_CORS_ORIGIN, ARG_DSN, ARG_PORT, ARG_REQUEST_TIMEOUT,
};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8000);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    Ok(Action::Server(Args {
        port,
        dsn: dsn.into(),
        request_timeout_seconds: matches
            .get_one::<u64>(ARG_REQUEST_TIMEOUT)
            .copied()
            .unwrap_or(10),
        cors_allowed_origin: matches
            .get_one::<String>(ARG_CORS_ORIGIN)
            .cloned()
            .unwrap_or_else(|| "*".to_string()),
        cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
        identity: identity::Options::parse(matches)?,
    }))
}
