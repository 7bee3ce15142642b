//! Game session repository
//!
//! This module provides:
//! - `SessionRepository` trait, the session store contract used by the
//!   accounting services
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! The schema allows at most one open session per user. An insert that would
//! create a second one fails with [`OpenSessionConflict`]. Updates only touch
//! a session that is still open; one closed in the meantime fails with
//! [`SessionAlreadyClosed`].

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{GameSession, ListParams};
use crate::services::time_accounting::day_bounds;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Raised by the store when a user already has an open session.
#[derive(Debug, thiserror::Error)]
#[error("user {user_id} already has an open game session")]
pub struct OpenSessionConflict {
    pub user_id: i64,
}

/// Raised by the store when a session was closed by another writer.
#[derive(Debug, thiserror::Error)]
#[error("game session {session_id} is no longer open")]
pub struct SessionAlreadyClosed {
    pub session_id: i64,
}

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// All sessions of a user that have no end time
    async fn find_open_by_user(&self, user_id: i64) -> Result<Vec<GameSession>>;

    /// Insert the session when it has no ID yet, otherwise update it while
    /// it is still open
    async fn save(&self, session: &GameSession) -> Result<GameSession>;

    /// Close `session` and record `tail`, the part played after midnight,
    /// in one transaction. A closed session of the same user and game that
    /// already starts at the tail's start is overwritten instead of
    /// duplicated. Returns the stored tail.
    async fn close_with_tail(
        &self,
        session: &GameSession,
        tail: &GameSession,
    ) -> Result<GameSession>;

    /// Sum of durations of the user's closed sessions that started on `day`
    async fn sum_duration_for_day(&self, user_id: i64, day: NaiveDate) -> Result<i64>;

    /// Get session by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<GameSession>>;

    /// List sessions, newest first, with the total count
    async fn list(&self, params: &ListParams) -> Result<(Vec<GameSession>, i64)>;

    /// The closed session with the earliest end time
    async fn earliest_ended(&self) -> Result<Option<GameSession>>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn find_open_by_user(&self, user_id: i64) -> Result<Vec<GameSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => find_open_sqlite(sqlite(&self.pool)?, user_id).await,
            DatabaseDriver::Mysql => find_open_mysql(mysql(&self.pool)?, user_id).await,
        }
    }

    async fn save(&self, session: &GameSession) -> Result<GameSession> {
        match (self.pool.driver(), session.is_persisted()) {
            (DatabaseDriver::Sqlite, false) => insert_sqlite(sqlite(&self.pool)?, session).await,
            (DatabaseDriver::Sqlite, true) => update_sqlite(sqlite(&self.pool)?, session).await,
            (DatabaseDriver::Mysql, false) => insert_mysql(mysql(&self.pool)?, session).await,
            (DatabaseDriver::Mysql, true) => update_mysql(mysql(&self.pool)?, session).await,
        }
    }

    async fn close_with_tail(
        &self,
        session: &GameSession,
        tail: &GameSession,
    ) -> Result<GameSession> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                close_with_tail_sqlite(sqlite(&self.pool)?, session, tail).await
            }
            DatabaseDriver::Mysql => close_with_tail_mysql(mysql(&self.pool)?, session, tail).await,
        }
    }

    async fn sum_duration_for_day(&self, user_id: i64, day: NaiveDate) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sum_for_day_sqlite(sqlite(&self.pool)?, user_id, day).await,
            DatabaseDriver::Mysql => sum_for_day_mysql(mysql(&self.pool)?, user_id, day).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<GameSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_by_id_sqlite(sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => get_by_id_mysql(mysql(&self.pool)?, id).await,
        }
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<GameSession>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sqlite(sqlite(&self.pool)?, params).await,
            DatabaseDriver::Mysql => list_mysql(mysql(&self.pool)?, params).await,
        }
    }

    async fn earliest_ended(&self) -> Result<Option<GameSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => earliest_ended_sqlite(sqlite(&self.pool)?).await,
            DatabaseDriver::Mysql => earliest_ended_mysql(mysql(&self.pool)?).await,
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, game_name, user_id, start_time, end_time, duration_minutes FROM game_sessions";

/// Translate a failed write, surfacing the open-session constraint as a typed error
fn map_write_error(err: sqlx::Error, user_id: i64, action: &'static str) -> anyhow::Error {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            anyhow::Error::new(OpenSessionConflict { user_id })
        }
        _ => anyhow::Error::new(err).context(action),
    }
}

const UPDATE_OPEN_SQL: &str = r#"
    UPDATE game_sessions
    SET game_name = ?, start_time = ?, end_time = ?, duration_minutes = ?
    WHERE id = ? AND end_time IS NULL
"#;

const CLOSE_OPEN_SQL: &str = r#"
    UPDATE game_sessions
    SET end_time = ?, duration_minutes = ?
    WHERE id = ? AND end_time IS NULL
"#;

const FIND_TAIL_SQL: &str = r#"
    SELECT id FROM game_sessions
    WHERE user_id = ? AND game_name = ? AND start_time = ? AND end_time IS NOT NULL AND id <> ?
    LIMIT 1
"#;

const UPDATE_TAIL_SQL: &str = r#"
    UPDATE game_sessions
    SET end_time = ?, duration_minutes = ?
    WHERE id = ?
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO game_sessions (game_name, user_id, start_time, end_time, duration_minutes)
    VALUES (?, ?, ?, ?, ?)
"#;

/// Explain an update that matched no open row
fn unmatched_update(existing: Option<GameSession>, session_id: i64) -> Result<()> {
    match existing {
        None => anyhow::bail!("Game session {} not found for update", session_id),
        Some(existing) if !existing.is_open() => Err(SessionAlreadyClosed { session_id }.into()),
        // MySQL counts matched-but-unchanged rows as unaffected
        Some(_) => Ok(()),
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn find_open_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<GameSession>> {
    let rows = sqlx::query(&format!(
        "{} WHERE user_id = ? AND end_time IS NULL ORDER BY start_time",
        SELECT_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to find open game sessions")?;

    Ok(rows.iter().map(row_to_session_sqlite).collect())
}

async fn insert_sqlite(pool: &SqlitePool, session: &GameSession) -> Result<GameSession> {
    let result = sqlx::query(INSERT_SQL)
        .bind(&session.game_name)
        .bind(session.user_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.duration_minutes)
        .execute(pool)
        .await
        .map_err(|e| map_write_error(e, session.user_id, "Failed to create game session"))?;

    Ok(GameSession {
        id: result.last_insert_rowid(),
        ..session.clone()
    })
}

async fn update_sqlite(pool: &SqlitePool, session: &GameSession) -> Result<GameSession> {
    let result = sqlx::query(UPDATE_OPEN_SQL)
        .bind(&session.game_name)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.duration_minutes)
        .bind(session.id)
        .execute(pool)
        .await
        .map_err(|e| map_write_error(e, session.user_id, "Failed to update game session"))?;

    if result.rows_affected() == 0 {
        unmatched_update(get_by_id_sqlite(pool, session.id).await?, session.id)?;
    }

    Ok(session.clone())
}

async fn close_with_tail_sqlite(
    pool: &SqlitePool,
    session: &GameSession,
    tail: &GameSession,
) -> Result<GameSession> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let closed = sqlx::query(CLOSE_OPEN_SQL)
        .bind(session.end_time)
        .bind(session.duration_minutes)
        .bind(session.id)
        .execute(&mut *tx)
        .await
        .context("Failed to close game session")?;

    if closed.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back transaction")?;
        return Err(SessionAlreadyClosed {
            session_id: session.id,
        }
        .into());
    }

    let leftover: Option<i64> = sqlx::query(FIND_TAIL_SQL)
        .bind(tail.user_id)
        .bind(&tail.game_name)
        .bind(tail.start_time)
        .bind(session.id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up split session")?
        .map(|row| row.get("id"));

    let id = match leftover {
        Some(id) => {
            sqlx::query(UPDATE_TAIL_SQL)
                .bind(tail.end_time)
                .bind(tail.duration_minutes)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to update split session")?;
            id
        }
        None => sqlx::query(INSERT_SQL)
            .bind(&tail.game_name)
            .bind(tail.user_id)
            .bind(tail.start_time)
            .bind(tail.end_time)
            .bind(tail.duration_minutes)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, tail.user_id, "Failed to create split session"))?
            .last_insert_rowid(),
    };

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(GameSession { id, ..tail.clone() })
}

async fn sum_for_day_sqlite(pool: &SqlitePool, user_id: i64, day: NaiveDate) -> Result<i64> {
    let (from, to) = day_bounds(day);
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(duration_minutes), 0) AS total
        FROM game_sessions
        WHERE user_id = ? AND end_time IS NOT NULL AND start_time >= ? AND start_time < ?
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
    .context("Failed to sum playtime for day")?;

    Ok(row.get("total"))
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<GameSession>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get game session by ID")?;

    Ok(row.as_ref().map(row_to_session_sqlite))
}

async fn list_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<(Vec<GameSession>, i64)> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM game_sessions")
        .fetch_one(pool)
        .await
        .context("Failed to count game sessions")?
        .get("count");

    let rows = sqlx::query(&format!(
        "{} ORDER BY start_time DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    ))
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list game sessions")?;

    Ok((rows.iter().map(row_to_session_sqlite).collect(), total))
}

async fn earliest_ended_sqlite(pool: &SqlitePool) -> Result<Option<GameSession>> {
    let row = sqlx::query(&format!(
        "{} WHERE end_time IS NOT NULL ORDER BY end_time ASC, id ASC LIMIT 1",
        SELECT_COLUMNS
    ))
    .fetch_optional(pool)
    .await
    .context("Failed to get earliest game session")?;

    Ok(row.as_ref().map(row_to_session_sqlite))
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> GameSession {
    GameSession {
        id: row.get("id"),
        game_name: row.get("game_name"),
        user_id: row.get("user_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        duration_minutes: row.get("duration_minutes"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn find_open_mysql(pool: &MySqlPool, user_id: i64) -> Result<Vec<GameSession>> {
    let rows = sqlx::query(&format!(
        "{} WHERE user_id = ? AND end_time IS NULL ORDER BY start_time",
        SELECT_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to find open game sessions")?;

    Ok(rows.iter().map(row_to_session_mysql).collect())
}

async fn insert_mysql(pool: &MySqlPool, session: &GameSession) -> Result<GameSession> {
    let result = sqlx::query(INSERT_SQL)
        .bind(&session.game_name)
        .bind(session.user_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.duration_minutes)
        .execute(pool)
        .await
        .map_err(|e| map_write_error(e, session.user_id, "Failed to create game session"))?;

    Ok(GameSession {
        id: result.last_insert_id() as i64,
        ..session.clone()
    })
}

async fn update_mysql(pool: &MySqlPool, session: &GameSession) -> Result<GameSession> {
    let result = sqlx::query(UPDATE_OPEN_SQL)
        .bind(&session.game_name)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.duration_minutes)
        .bind(session.id)
        .execute(pool)
        .await
        .map_err(|e| map_write_error(e, session.user_id, "Failed to update game session"))?;

    if result.rows_affected() == 0 {
        unmatched_update(get_by_id_mysql(pool, session.id).await?, session.id)?;
    }

    Ok(session.clone())
}

async fn close_with_tail_mysql(
    pool: &MySqlPool,
    session: &GameSession,
    tail: &GameSession,
) -> Result<GameSession> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let closed = sqlx::query(CLOSE_OPEN_SQL)
        .bind(session.end_time)
        .bind(session.duration_minutes)
        .bind(session.id)
        .execute(&mut *tx)
        .await
        .context("Failed to close game session")?;

    if closed.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back transaction")?;
        return Err(SessionAlreadyClosed {
            session_id: session.id,
        }
        .into());
    }

    let leftover: Option<i64> = sqlx::query(FIND_TAIL_SQL)
        .bind(tail.user_id)
        .bind(&tail.game_name)
        .bind(tail.start_time)
        .bind(session.id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up split session")?
        .map(|row| row.get("id"));

    let id = match leftover {
        Some(id) => {
            sqlx::query(UPDATE_TAIL_SQL)
                .bind(tail.end_time)
                .bind(tail.duration_minutes)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Failed to update split session")?;
            id
        }
        None => sqlx::query(INSERT_SQL)
            .bind(&tail.game_name)
            .bind(tail.user_id)
            .bind(tail.start_time)
            .bind(tail.end_time)
            .bind(tail.duration_minutes)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, tail.user_id, "Failed to create split session"))?
            .last_insert_id() as i64,
    };

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(GameSession { id, ..tail.clone() })
}

async fn sum_for_day_mysql(pool: &MySqlPool, user_id: i64, day: NaiveDate) -> Result<i64> {
    let (from, to) = day_bounds(day);
    let row = sqlx::query(
        r#"
        SELECT CAST(COALESCE(SUM(duration_minutes), 0) AS SIGNED) AS total
        FROM game_sessions
        WHERE user_id = ? AND end_time IS NOT NULL AND start_time >= ? AND start_time < ?
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
    .context("Failed to sum playtime for day")?;

    Ok(row.get("total"))
}

async fn get_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<GameSession>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get game session by ID")?;

    Ok(row.as_ref().map(row_to_session_mysql))
}

async fn list_mysql(pool: &MySqlPool, params: &ListParams) -> Result<(Vec<GameSession>, i64)> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM game_sessions")
        .fetch_one(pool)
        .await
        .context("Failed to count game sessions")?
        .get("count");

    let rows = sqlx::query(&format!(
        "{} ORDER BY start_time DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    ))
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list game sessions")?;

    Ok((rows.iter().map(row_to_session_mysql).collect(), total))
}

async fn earliest_ended_mysql(pool: &MySqlPool) -> Result<Option<GameSession>> {
    let row = sqlx::query(&format!(
        "{} WHERE end_time IS NOT NULL ORDER BY end_time ASC, id ASC LIMIT 1",
        SELECT_COLUMNS
    ))
    .fetch_optional(pool)
    .await
    .context("Failed to get earliest game session")?;

    Ok(row.as_ref().map(row_to_session_mysql))
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> GameSession {
    GameSession {
        id: row.get("id"),
        game_name: row.get("game_name"),
        user_id: row.get("user_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        duration_minutes: row.get("duration_minutes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::{DateTime, TimeZone, Utc};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    // Helper to create a test user for the foreign key
    async fn create_test_user(pool: &DynDatabasePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, daily_quota_minutes) VALUES (?, 60)")
            .bind(username)
            .execute(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to create test user")
            .last_insert_rowid()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn closed(user_id: i64, game: &str, start: DateTime<Utc>, minutes: i64) -> GameSession {
        GameSession::closed(
            user_id,
            game,
            start,
            start + chrono::Duration::minutes(minutes),
            minutes,
        )
    }

    #[tokio::test]
    async fn test_save_assigns_id_on_insert() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;

        let saved = repo
            .save(&GameSession::open(user_id, "chess", at(1, 10, 0)))
            .await
            .expect("Failed to save session");

        assert!(saved.id > 0);
        let found = repo.get_by_id(saved.id).await.unwrap().expect("Session not found");
        assert_eq!(found, saved);
    }

    #[tokio::test]
    async fn test_save_updates_existing_session() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;

        let mut session = repo
            .save(&GameSession::open(user_id, "chess", at(1, 10, 0)))
            .await
            .unwrap();
        session.close(at(1, 10, 45), 45);
        repo.save(&session).await.expect("Failed to update session");

        let found = repo.get_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(found.end_time, Some(at(1, 10, 45)));
        assert_eq!(found.duration_minutes, 45);
        assert!(repo.find_open_by_user(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_of_unknown_session_fails() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;

        let mut ghost = closed(user_id, "chess", at(1, 10, 0), 5);
        ghost.id = 999;
        assert!(repo.save(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_update_of_closed_session_is_rejected() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;

        let mut session = repo
            .save(&GameSession::open(user_id, "chess", at(1, 10, 0)))
            .await
            .unwrap();
        session.close(at(1, 10, 45), 45);
        repo.save(&session).await.unwrap();

        session.close(at(1, 11, 0), 60);
        let err = repo.save(&session).await.expect_err("Closed session must not change");
        assert!(err.downcast_ref::<SessionAlreadyClosed>().is_some());

        let found = repo.get_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(found.duration_minutes, 45);
    }

    fn split(session: &GameSession, minutes_after_midnight: i64) -> (GameSession, GameSession) {
        let mut original = session.clone();
        let boundary = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
        original.close(boundary, 29);
        let tail = closed(
            session.user_id,
            &session.game_name,
            at(2, 0, 0),
            minutes_after_midnight,
        );
        (original, tail)
    }

    #[tokio::test]
    async fn test_close_with_tail_writes_both_segments() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;
        let open = repo
            .save(&GameSession::open(user_id, "chess", at(1, 23, 30)))
            .await
            .unwrap();

        let (original, tail) = split(&open, 15);
        let tail = repo.close_with_tail(&original, &tail).await.unwrap();

        assert!(tail.id > open.id);
        assert_eq!(repo.get_by_id(open.id).await.unwrap().unwrap(), original);
        assert_eq!(repo.get_by_id(tail.id).await.unwrap().unwrap(), tail);
        assert!(repo.find_open_by_user(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_with_tail_on_closed_session_writes_nothing() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;
        let open = repo
            .save(&GameSession::open(user_id, "chess", at(1, 23, 30)))
            .await
            .unwrap();

        let (original, tail) = split(&open, 15);
        repo.close_with_tail(&original, &tail).await.unwrap();

        let err = repo
            .close_with_tail(&original, &tail)
            .await
            .expect_err("Second close must be rejected");
        let closed = err
            .downcast_ref::<SessionAlreadyClosed>()
            .expect("Expected SessionAlreadyClosed");
        assert_eq!(closed.session_id, open.id);

        let (_, total) = repo.list(&ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 2);
        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(repo.sum_duration_for_day(user_id, day).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_close_with_tail_replaces_leftover_tail() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;
        let open = repo
            .save(&GameSession::open(user_id, "chess", at(1, 23, 30)))
            .await
            .unwrap();
        // Tail written by an earlier attempt that never closed the original
        let leftover = repo.save(&closed(user_id, "chess", at(2, 0, 0), 15)).await.unwrap();

        let (original, tail) = split(&open, 20);
        let tail = repo.close_with_tail(&original, &tail).await.unwrap();

        assert_eq!(tail.id, leftover.id);
        let (_, total) = repo.list(&ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 2);
        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(repo.sum_duration_for_day(user_id, day).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_second_open_session_is_a_conflict() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;

        repo.save(&GameSession::open(user_id, "chess", at(1, 10, 0)))
            .await
            .unwrap();
        let err = repo
            .save(&GameSession::open(user_id, "go", at(1, 10, 5)))
            .await
            .expect_err("Second open session must be rejected");

        let conflict = err
            .downcast_ref::<OpenSessionConflict>()
            .expect("Expected an OpenSessionConflict");
        assert_eq!(conflict.user_id, user_id);
        assert_eq!(repo.find_open_by_user(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_sessions_are_per_user() {
        let (pool, repo) = setup_test_repo().await;
        let ana = create_test_user(&pool, "ana").await;
        let bob = create_test_user(&pool, "bob").await;

        repo.save(&GameSession::open(ana, "chess", at(1, 10, 0))).await.unwrap();
        repo.save(&GameSession::open(bob, "chess", at(1, 10, 0))).await.unwrap();
        repo.save(&closed(ana, "go", at(1, 8, 0), 30)).await.unwrap();

        let open = repo.find_open_by_user(ana).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].game_name, "chess");
    }

    #[tokio::test]
    async fn test_sum_duration_for_day_counts_closed_sessions_started_that_day() {
        let (pool, repo) = setup_test_repo().await;
        let ana = create_test_user(&pool, "ana").await;
        let bob = create_test_user(&pool, "bob").await;

        repo.save(&closed(ana, "chess", at(1, 0, 0), 20)).await.unwrap();
        repo.save(&closed(ana, "go", at(1, 23, 0), 59)).await.unwrap();
        repo.save(&closed(ana, "go", at(2, 0, 0), 15)).await.unwrap();
        repo.save(&closed(bob, "go", at(1, 12, 0), 100)).await.unwrap();
        repo.save(&GameSession::open(ana, "chess", at(1, 12, 0))).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(repo.sum_duration_for_day(ana, day).await.unwrap(), 79);

        let next = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(repo.sum_duration_for_day(ana, next).await.unwrap(), 15);

        let empty = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        assert_eq!(repo.sum_duration_for_day(ana, empty).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_is_paginated_newest_first() {
        let (pool, repo) = setup_test_repo().await;
        let ana = create_test_user(&pool, "ana").await;

        for hour in 1..=5 {
            repo.save(&closed(ana, "chess", at(1, hour, 0), 10)).await.unwrap();
        }

        let (page, total) = repo.list(&ListParams::new(1, 2)).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].start_time, at(1, 5, 0));
        assert_eq!(page[1].start_time, at(1, 4, 0));

        let (last, _) = repo.list(&ListParams::new(3, 2)).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].start_time, at(1, 1, 0));
    }

    #[tokio::test]
    async fn test_earliest_ended_ignores_open_sessions() {
        let (pool, repo) = setup_test_repo().await;
        let ana = create_test_user(&pool, "ana").await;
        let bob = create_test_user(&pool, "bob").await;

        assert!(repo.earliest_ended().await.unwrap().is_none());

        repo.save(&GameSession::open(bob, "chess", at(1, 1, 0))).await.unwrap();
        repo.save(&closed(ana, "late", at(2, 9, 0), 10)).await.unwrap();
        repo.save(&closed(ana, "early", at(1, 9, 0), 10)).await.unwrap();

        let earliest = repo.earliest_ended().await.unwrap().unwrap();
        assert_eq!(earliest.game_name, "early");
    }
}
