use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};
use std::time::Duration;
use tracing::{info_span, Instrument};

use super::{CreateUserOutcome, NewTrade, NewUser, Store, User};
use crate::identity::BoxFuture;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const USER_COLUMNS: &str =
    "user_id, email, first_name, last_name, full_name, profile_url, created_at";

/// PostgreSQL-backed [`Store`].
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database.
    ///
    /// # Errors
    /// Returns an error if the pool cannot be created.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create missing tables and indexes.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be applied.
    pub async fn migrate(&self) -> Result<()> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "MIGRATE",
            db.statement = "sql/schema.sql"
        );
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("Failed to apply database schema")?;
        Ok(())
    }

    async fn fetch_user(&self, column: &'static str, value: &str) -> Result<Option<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1 AND deleted_at IS NULL"
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to lookup user by {column}"))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&self, user: &NewUser) -> Result<CreateUserOutcome> {
        let query = r"
            INSERT INTO users
                (user_id, email, first_name, last_name, full_name)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(&user.user_id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.full_name)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(CreateUserOutcome::Created),
            Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn insert_trade(&self, trade: &NewTrade) -> Result<()> {
        let query = r"
            INSERT INTO trades
                (trade_id, user_id, asset, open_position_at, close_position_at,
                 margin, open_price, close_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(trade.trade_id)
            .bind(&trade.user_id)
            .bind(&trade.asset)
            .bind(trade.open_position_at)
            .bind(trade.close_position_at)
            .bind(trade.margin)
            .bind(trade.open_price)
            .bind(trade.close_price)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert trade")?;
        Ok(())
    }

    async fn select_one(&self) -> Result<()> {
        let query = "SELECT 1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("database ping failed")?;
        Ok(())
    }
}

impl Store for PgStore {
    fn user_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(self.fetch_user("email", email))
    }

    fn user_by_id<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<User>>> {
        Box::pin(self.fetch_user("user_id", user_id))
    }

    fn create_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<CreateUserOutcome>> {
        Box::pin(self.insert_user(user))
    }

    fn create_trade<'a>(&'a self, trade: &'a NewTrade) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.insert_trade(trade))
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.select_one())
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        full_name: row.try_get("full_name")?,
        profile_url: row.try_get("profile_url")?,
        created_at: row.try_get("created_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
