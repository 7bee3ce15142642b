//! Session accounting service
//!
//! Opens and closes game sessions for a caller, splitting a session that
//! crosses midnight into two day-bounded records, and checks the caller's
//! daily quota when a session starts.
//!
//! Every operation classifies the caller's open sessions exactly once
//! through [`OpenSessionGuard`] and branches on that single result.
//!
//! Closing only succeeds while the session is still open, so of two
//! overlapping `end_session` calls one wins and the other is a conflict.
//! A split closes the original and records the after-midnight segment in
//! one transaction; a segment left behind by an earlier attempt is replaced
//! rather than counted twice.

use crate::db::repositories::{
    OpenSessionConflict, SessionAlreadyClosed, SessionRepository, UserRepository,
};
use crate::models::{GameSession, User};
use crate::services::clock::DynClock;
use crate::services::open_session_guard::{OpenSessionGuard, OpenSessions};
use crate::services::quota::exceeds_quota;
use crate::services::time_accounting::{
    end_of_day, is_same_calendar_day, minutes_between, start_of_day, InvalidDay,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Error types for session accounting operations
#[derive(Debug, thiserror::Error)]
pub enum SessionServiceError {
    /// Malformed input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A session is already open for the caller
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Daily quota exceeded. The session was still recorded.
    #[error("Daily quota exceeded: {played_minutes} minutes played today, quota is {quota_minutes}")]
    OverQuotaError {
        session_id: i64,
        played_minutes: i64,
        quota_minutes: i64,
    },

    /// Zero or several open sessions where exactly one was expected,
    /// or several where at most one was expected
    #[error("Inconsistent state: {0}")]
    InconsistentStateError(String),

    /// Unknown caller
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Store failure
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<InvalidDay> for SessionServiceError {
    fn from(err: InvalidDay) -> Self {
        SessionServiceError::ValidationError(err.to_string())
    }
}

/// Orchestrates the session lifecycle for callers identified by username.
pub struct SessionAccountingService {
    session_repo: Arc<dyn SessionRepository>,
    user_repo: Arc<dyn UserRepository>,
    guard: OpenSessionGuard,
    clock: DynClock,
}

impl SessionAccountingService {
    /// Create a new session accounting service
    pub fn new(
        session_repo: Arc<dyn SessionRepository>,
        user_repo: Arc<dyn UserRepository>,
        clock: DynClock,
    ) -> Self {
        Self {
            guard: OpenSessionGuard::new(session_repo.clone()),
            session_repo,
            user_repo,
            clock,
        }
    }

    /// Open a session starting now.
    ///
    /// When the minutes already closed today exceed the caller's quota the
    /// session is still saved, then `OverQuotaError` is returned.
    pub async fn start_session(
        &self,
        caller: &str,
        game_name: &str,
    ) -> Result<GameSession, SessionServiceError> {
        let game_name = validate_game_name(game_name)?;
        let user = self.resolve_caller(caller).await?;
        self.ensure_no_open_session(&user).await?;

        let now = self.clock.now();
        let played = self
            .session_repo
            .sum_duration_for_day(user.id, now.date_naive())
            .await?;

        let session = self
            .persist_new(GameSession::open(user.id, game_name, now))
            .await?;
        tracing::info!(
            "Opened session {} for '{}' playing '{}'",
            session.id,
            user.username,
            session.game_name
        );

        if exceeds_quota(played, user.daily_quota_minutes) {
            tracing::warn!(
                "Player '{}' is over quota ({} > {} minutes), session {} recorded",
                user.username,
                played,
                user.daily_quota_minutes,
                session.id
            );
            return Err(SessionServiceError::OverQuotaError {
                session_id: session.id,
                played_minutes: played,
                quota_minutes: user.daily_quota_minutes,
            });
        }

        Ok(session)
    }

    /// Open a session that started at `started_at`, which must not be in
    /// the future. The daily quota is not checked.
    pub async fn start_backdated_session(
        &self,
        caller: &str,
        game_name: &str,
        started_at: DateTime<Utc>,
    ) -> Result<GameSession, SessionServiceError> {
        let game_name = validate_game_name(game_name)?;
        let now = self.clock.now();
        if started_at > now {
            return Err(SessionServiceError::ValidationError(format!(
                "start time {} is in the future",
                started_at.to_rfc3339()
            )));
        }

        let user = self.resolve_caller(caller).await?;
        self.ensure_no_open_session(&user).await?;

        let session = self
            .persist_new(GameSession::open(user.id, game_name, started_at))
            .await?;
        tracing::info!(
            "Opened backdated session {} for '{}' from {}",
            session.id,
            user.username,
            started_at.to_rfc3339()
        );
        Ok(session)
    }

    /// Close the caller's open session at the current time.
    ///
    /// Returns the closed record. When the session started on an earlier day
    /// this is the first segment, ending at 23:59:59 of its start day, and a
    /// second closed record covers today from midnight until now. Only one
    /// split is made however many days have passed.
    pub async fn end_session(&self, caller: &str) -> Result<GameSession, SessionServiceError> {
        let user = self.resolve_caller(caller).await?;
        let now = self.clock.now();

        let mut session = match self.guard.classify(user.id).await? {
            OpenSessions::One(session) => session,
            OpenSessions::None => {
                tracing::warn!("End requested for '{}' with no open session", user.username);
                return Err(SessionServiceError::InconsistentStateError(format!(
                    "no open session for player '{}'",
                    user.username
                )));
            }
            OpenSessions::Many(sessions) => return Err(many_open(&user, sessions.len())),
        };

        if now < session.start_time {
            return Err(SessionServiceError::InconsistentStateError(format!(
                "session {} starts after the current time",
                session.id
            )));
        }

        if is_same_calendar_day(session.start_time, now) {
            session.close(now, minutes_between(session.start_time, now));
            let closed = self
                .session_repo
                .save(&session)
                .await
                .map_err(already_closed)?;
            tracing::info!(
                "Closed session {} for '{}' after {} minutes",
                closed.id,
                user.username,
                closed.duration_minutes
            );
            return Ok(closed);
        }

        let today = start_of_day(now);
        let tail = GameSession::closed(
            user.id,
            session.game_name.clone(),
            today,
            now,
            minutes_between(today, now),
        );
        let boundary = end_of_day(session.start_time);
        session.close(boundary, minutes_between(session.start_time, boundary));
        let tail = self
            .session_repo
            .close_with_tail(&session, &tail)
            .await
            .map_err(already_closed)?;

        tracing::info!(
            "Split session {} for '{}' at midnight: {} + {} minutes (new session {})",
            session.id,
            user.username,
            session.duration_minutes,
            tail.duration_minutes,
            tail.id
        );
        Ok(session)
    }

    /// Minutes elapsed in the caller's open session, `None` when there is no
    /// single open session.
    pub async fn current_duration(&self, caller: &str) -> Result<Option<i64>, SessionServiceError> {
        let user = self.resolve_caller(caller).await?;
        match self.guard.classify(user.id).await? {
            OpenSessions::One(session) => {
                Ok(Some(minutes_between(session.start_time, self.clock.now())))
            }
            OpenSessions::None => Ok(None),
            OpenSessions::Many(sessions) => {
                tracing::warn!(
                    "Player '{}' has {} open sessions, reporting none active",
                    user.username,
                    sessions.len()
                );
                Ok(None)
            }
        }
    }

    /// Minutes recorded by closed sessions that started on `day`.
    ///
    /// A session still open contributes nothing until it is closed.
    pub async fn total_playtime_for_day(
        &self,
        caller: &str,
        day: NaiveDate,
    ) -> Result<i64, SessionServiceError> {
        let user = self.resolve_caller(caller).await?;
        Ok(self.session_repo.sum_duration_for_day(user.id, day).await?)
    }

    /// The current UTC day and the minutes recorded on it
    pub async fn today_playtime(
        &self,
        caller: &str,
    ) -> Result<(NaiveDate, i64), SessionServiceError> {
        let today = self.clock.now().date_naive();
        let minutes = self.total_playtime_for_day(caller, today).await?;
        Ok((today, minutes))
    }

    async fn resolve_caller(&self, caller: &str) -> Result<User, SessionServiceError> {
        self.user_repo
            .get_by_username(caller)
            .await?
            .ok_or_else(|| SessionServiceError::NotFoundError(format!("player '{}'", caller)))
    }

    async fn ensure_no_open_session(&self, user: &User) -> Result<(), SessionServiceError> {
        match self.guard.classify(user.id).await? {
            OpenSessions::None => Ok(()),
            OpenSessions::One(open) => Err(SessionServiceError::ConflictError(format!(
                "a session is already open for '{}' (session {})",
                user.username, open.id
            ))),
            OpenSessions::Many(sessions) => Err(many_open(user, sessions.len())),
        }
    }

    /// Insert a new open session; a concurrent start that won the race
    /// surfaces as a conflict
    async fn persist_new(&self, session: GameSession) -> Result<GameSession, SessionServiceError> {
        self.session_repo.save(&session).await.map_err(|err| {
            match err.downcast_ref::<OpenSessionConflict>() {
                Some(conflict) => SessionServiceError::ConflictError(conflict.to_string()),
                None => SessionServiceError::InternalError(err),
            }
        })
    }
}

fn validate_game_name(game_name: &str) -> Result<&str, SessionServiceError> {
    let game_name = game_name.trim();
    if game_name.is_empty() {
        return Err(SessionServiceError::ValidationError(
            "game name cannot be empty".to_string(),
        ));
    }
    Ok(game_name)
}

/// A close that lost to another writer surfaces as a conflict
fn already_closed(err: anyhow::Error) -> SessionServiceError {
    match err.downcast_ref::<SessionAlreadyClosed>() {
        Some(closed) => SessionServiceError::ConflictError(closed.to_string()),
        None => SessionServiceError::InternalError(err),
    }
}

fn many_open(user: &User, count: usize) -> SessionServiceError {
    tracing::error!(
        "Player '{}' has {} open sessions, refusing to continue",
        user.username,
        count
    );
    SessionServiceError::InconsistentStateError(format!(
        "{} open sessions for player '{}'",
        count, user.username
    ))
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::services::clock::FixedClock;
    use crate::services::testing::{InMemorySessionRepository, InMemoryUserRepository};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        End,
        Wait(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::End),
            (1i64..3000).prop_map(Op::Wait),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// After any sequence of starts and ends a player has at most one
        /// open session, and every closed session is a non-negative span
        /// within one calendar day.
        #[test]
        fn prop_open_sessions_never_exceed_one(ops in prop::collection::vec(op(), 1..40)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let users = Arc::new(InMemoryUserRepository::default());
                let user = users.create(&User::new("ana", 240)).await.unwrap();
                let sessions = Arc::new(InMemorySessionRepository::default());
                let clock = Arc::new(FixedClock::new(
                    Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap(),
                ));
                let service =
                    SessionAccountingService::new(sessions.clone(), users, clock.clone());

                for op in ops {
                    match op {
                        Op::Start => {
                            let _ = service.start_session("ana", "chess").await;
                        }
                        Op::End => {
                            let _ = service.end_session("ana").await;
                        }
                        Op::Wait(minutes) => clock.advance(Duration::minutes(minutes)),
                    }

                    let open = sessions.find_open_by_user(user.id).await.unwrap();
                    prop_assert!(open.len() <= 1);
                }

                for session in sessions.all().iter().filter(|s| !s.is_open()) {
                    let end = session.end_time.unwrap();
                    prop_assert!(session.duration_minutes >= 0);
                    prop_assert_eq!(
                        session.duration_minutes,
                        minutes_between(session.start_time, end)
                    );
                    prop_assert!(is_same_calendar_day(session.start_time, end));
                }
                Ok(())
            });
            result?;
        }
    }
}
