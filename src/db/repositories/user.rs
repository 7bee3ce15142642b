//! User repository
//!
//! Database operations for players.
//!
//! This module provides:
//! - `UserRepository` trait, the user directory used to resolve callers and
//!   read their daily quota
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{ListParams, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Raised by the store when a username is already registered.
#[derive(Debug, thiserror::Error)]
#[error("username '{0}' is already taken")]
pub struct UsernameTaken(pub String);

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Set a user's daily quota, returning the updated user
    async fn update_daily_quota(&self, id: i64, minutes: i64) -> Result<Option<User>>;

    /// Delete a user and, through the foreign key, their sessions.
    /// Returns whether a user was removed.
    async fn delete_by_username(&self, username: &str) -> Result<bool>;

    /// List users ordered by ID with pagination
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// List users whose quota is strictly above `minutes`
    async fn list_above_quota(&self, minutes: i64, params: &ListParams)
        -> Result<(Vec<User>, i64)>;

    /// The user with the smallest daily quota
    async fn lowest_quota(&self) -> Result<Option<User>>;

    /// The user with the largest daily quota
    async fn highest_quota(&self) -> Result<Option<User>>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(sqlite(&self.pool)?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(mysql(&self.pool)?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let query = format!("{} WHERE id = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_one_user_sqlite(sqlite(&self.pool)?, &query, Bind::Int(id)).await
            }
            DatabaseDriver::Mysql => {
                fetch_one_user_mysql(mysql(&self.pool)?, &query, Bind::Int(id)).await
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let query = format!("{} WHERE username = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_one_user_sqlite(sqlite(&self.pool)?, &query, Bind::Text(username)).await
            }
            DatabaseDriver::Mysql => {
                fetch_one_user_mysql(mysql(&self.pool)?, &query, Bind::Text(username)).await
            }
        }
    }

    async fn update_daily_quota(&self, id: i64, minutes: i64) -> Result<Option<User>> {
        let sql = "UPDATE users SET daily_quota_minutes = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(minutes)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update daily quota")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(minutes)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update daily quota")?;
            }
        }
        self.get_by_id(id).await
    }

    async fn delete_by_username(&self, username: &str) -> Result<bool> {
        let sql = "DELETE FROM users WHERE username = ?";
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(username)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to delete user")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(username)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to delete user")?
                .rows_affected(),
        };
        Ok(result > 0)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(sqlite(&self.pool)?, None, params).await,
            DatabaseDriver::Mysql => list_users_mysql(mysql(&self.pool)?, None, params).await,
        }
    }

    async fn list_above_quota(
        &self,
        minutes: i64,
        params: &ListParams,
    ) -> Result<(Vec<User>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_users_sqlite(sqlite(&self.pool)?, Some(minutes), params).await
            }
            DatabaseDriver::Mysql => {
                list_users_mysql(mysql(&self.pool)?, Some(minutes), params).await
            }
        }
    }

    async fn lowest_quota(&self) -> Result<Option<User>> {
        let query = format!(
            "{} ORDER BY daily_quota_minutes ASC, id ASC LIMIT 1",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_one_user_sqlite(sqlite(&self.pool)?, &query, Bind::None).await
            }
            DatabaseDriver::Mysql => {
                fetch_one_user_mysql(mysql(&self.pool)?, &query, Bind::None).await
            }
        }
    }

    async fn highest_quota(&self) -> Result<Option<User>> {
        let query = format!(
            "{} ORDER BY daily_quota_minutes DESC, id ASC LIMIT 1",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_one_user_sqlite(sqlite(&self.pool)?, &query, Bind::None).await
            }
            DatabaseDriver::Mysql => {
                fetch_one_user_mysql(mysql(&self.pool)?, &query, Bind::None).await
            }
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, username, daily_quota_minutes, created_at FROM users";

/// Single optional parameter for lookup queries
enum Bind<'a> {
    None,
    Int(i64),
    Text(&'a str),
}

fn map_create_error(err: sqlx::Error, username: &str) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            anyhow::Error::new(UsernameTaken(username.to_string()))
        }
        _ => anyhow::Error::new(err).context("Failed to create user"),
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        "INSERT INTO users (username, daily_quota_minutes, created_at) VALUES (?, ?, ?)",
    )
    .bind(&user.username)
    .bind(user.daily_quota_minutes)
    .bind(user.created_at)
    .execute(pool)
    .await
    .map_err(|e| map_create_error(e, &user.username))?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn fetch_one_user_sqlite(
    pool: &SqlitePool,
    query: &str,
    bind: Bind<'_>,
) -> Result<Option<User>> {
    let query = sqlx::query(query);
    let query = match bind {
        Bind::None => query,
        Bind::Int(value) => query.bind(value),
        Bind::Text(value) => query.bind(value),
    };

    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn count_users_sqlite(pool: &SqlitePool, above: Option<i64>) -> Result<i64> {
    let row = match above {
        Some(minutes) => {
            sqlx::query("SELECT COUNT(*) AS count FROM users WHERE daily_quota_minutes > ?")
                .bind(minutes)
                .fetch_one(pool)
                .await
        }
        None => {
            sqlx::query("SELECT COUNT(*) AS count FROM users")
                .fetch_one(pool)
                .await
        }
    }
    .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_sqlite(
    pool: &SqlitePool,
    above: Option<i64>,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let total = count_users_sqlite(pool, above).await?;

    let rows = match above {
        Some(minutes) => {
            sqlx::query(&format!(
                "{} WHERE daily_quota_minutes > ? ORDER BY id LIMIT ? OFFSET ?",
                SELECT_COLUMNS
            ))
            .bind(minutes)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!("{} ORDER BY id LIMIT ? OFFSET ?", SELECT_COLUMNS))
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
        }
    }
    .context("Failed to list users")?;

    Ok((rows.iter().map(row_to_user_sqlite).collect(), total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        daily_quota_minutes: row.get("daily_quota_minutes"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query(
        "INSERT INTO users (username, daily_quota_minutes, created_at) VALUES (?, ?, ?)",
    )
    .bind(&user.username)
    .bind(user.daily_quota_minutes)
    .bind(user.created_at)
    .execute(pool)
    .await
    .map_err(|e| map_create_error(e, &user.username))?;

    Ok(User {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn fetch_one_user_mysql(
    pool: &MySqlPool,
    query: &str,
    bind: Bind<'_>,
) -> Result<Option<User>> {
    let query = sqlx::query(query);
    let query = match bind {
        Bind::None => query,
        Bind::Int(value) => query.bind(value),
        Bind::Text(value) => query.bind(value),
    };

    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get user")?;

    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn count_users_mysql(pool: &MySqlPool, above: Option<i64>) -> Result<i64> {
    let row = match above {
        Some(minutes) => {
            sqlx::query("SELECT COUNT(*) AS count FROM users WHERE daily_quota_minutes > ?")
                .bind(minutes)
                .fetch_one(pool)
                .await
        }
        None => {
            sqlx::query("SELECT COUNT(*) AS count FROM users")
                .fetch_one(pool)
                .await
        }
    }
    .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_mysql(
    pool: &MySqlPool,
    above: Option<i64>,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let total = count_users_mysql(pool, above).await?;

    let rows = match above {
        Some(minutes) => {
            sqlx::query(&format!(
                "{} WHERE daily_quota_minutes > ? ORDER BY id LIMIT ? OFFSET ?",
                SELECT_COLUMNS
            ))
            .bind(minutes)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(&format!("{} ORDER BY id LIMIT ? OFFSET ?", SELECT_COLUMNS))
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
        }
    }
    .context("Failed to list users")?;

    Ok((rows.iter().map(row_to_user_mysql).collect(), total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        daily_quota_minutes: row.get("daily_quota_minutes"),
        created_at: row.get("created_at"),
    }
}
