//! Persistence for users and trades.
//!
//! Handlers only see the [`Store`] trait; [`PgStore`] is the PostgreSQL
//! implementation used by the server.

mod postgres;

#[cfg(test)]
pub(crate) mod memory;

pub use postgres::PgStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::identity::BoxFuture;

/// A user profile. `user_id` is the identity provider username.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub profile_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

/// A validated trade ready to be inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewTrade {
    pub trade_id: Uuid,
    pub user_id: String,
    pub asset: String,
    pub open_position_at: DateTime<Utc>,
    pub close_position_at: DateTime<Utc>,
    pub margin: f64,
    pub open_price: f64,
    pub close_price: f64,
}

/// Outcome when inserting a new user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    /// The username or email is already taken.
    Conflict,
}

pub trait Store: Send + Sync {
    fn user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>>;

    fn user_by_id<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<User>>>;

    fn create_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<CreateUserOutcome>>;

    fn create_trade<'a>(&'a self, trade: &'a NewTrade) -> BoxFuture<'a, Result<()>>;

    /// Check that the store is reachable.
    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}
