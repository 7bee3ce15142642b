//! In-memory repositories for service tests.
//!
//! The session store mirrors the schema's one-open-session rule on `save`,
//! while `insert_raw` bypasses it so tests can build corrupted states the
//! real database refuses to hold.

use crate::db::repositories::{
    OpenSessionConflict, SessionAlreadyClosed, SessionRepository, UserRepository, UsernameTaken,
};
use crate::models::{GameSession, ListParams, User};
use crate::services::time_accounting::day_bounds;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<Vec<GameSession>>,
    saves: AtomicUsize,
    open_queries: AtomicUsize,
}

impl InMemorySessionRepository {
    /// Store a session without any checks, assigning an ID
    pub fn insert_raw(&self, mut session: GameSession) -> GameSession {
        let mut sessions = self.sessions.lock().unwrap();
        session.id = sessions.len() as i64 + 1;
        sessions.push(session.clone());
        session
    }

    pub fn all(&self) -> Vec<GameSession> {
        self.sessions.lock().unwrap().clone()
    }

    /// Number of successful `save` calls
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `find_open_by_user` calls
    pub fn open_queries(&self) -> usize {
        self.open_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_open_by_user(&self, user_id: i64) -> Result<Vec<GameSession>> {
        self.open_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .all()
            .into_iter()
            .filter(|s| s.user_id == user_id && s.is_open())
            .collect())
    }

    async fn save(&self, session: &GameSession) -> Result<GameSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let clashes = session.is_open()
            && sessions
                .iter()
                .any(|s| s.user_id == session.user_id && s.is_open() && s.id != session.id);
        if clashes {
            return Err(OpenSessionConflict {
                user_id: session.user_id,
            }
            .into());
        }

        let saved = if session.is_persisted() {
            let slot = sessions
                .iter_mut()
                .find(|s| s.id == session.id)
                .ok_or_else(|| anyhow::anyhow!("Game session {} not found", session.id))?;
            if !slot.is_open() {
                return Err(SessionAlreadyClosed {
                    session_id: session.id,
                }
                .into());
            }
            *slot = session.clone();
            session.clone()
        } else {
            let saved = GameSession {
                id: sessions.len() as i64 + 1,
                ..session.clone()
            };
            sessions.push(saved.clone());
            saved
        };
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(saved)
    }

    async fn close_with_tail(
        &self,
        session: &GameSession,
        tail: &GameSession,
    ) -> Result<GameSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let slot = sessions
            .iter_mut()
            .find(|s| s.id == session.id && s.is_open())
            .ok_or(SessionAlreadyClosed {
                session_id: session.id,
            })?;
        *slot = session.clone();

        let leftover = sessions.iter_mut().find(|s| {
            s.id != session.id
                && !s.is_open()
                && s.user_id == tail.user_id
                && s.game_name == tail.game_name
                && s.start_time == tail.start_time
        });
        let saved = match leftover {
            Some(existing) => {
                *existing = GameSession {
                    id: existing.id,
                    ..tail.clone()
                };
                existing.clone()
            }
            None => {
                let saved = GameSession {
                    id: sessions.len() as i64 + 1,
                    ..tail.clone()
                };
                sessions.push(saved.clone());
                saved
            }
        };
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(saved)
    }

    async fn sum_duration_for_day(&self, user_id: i64, day: NaiveDate) -> Result<i64> {
        let (from, to) = day_bounds(day);
        Ok(self
            .all()
            .iter()
            .filter(|s| s.user_id == user_id && !s.is_open())
            .filter(|s| s.start_time >= from && s.start_time < to)
            .map(|s| s.duration_minutes)
            .sum())
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<GameSession>> {
        Ok(self.all().into_iter().find(|s| s.id == id))
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<GameSession>, i64)> {
        let mut sessions = self.all();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        let total = sessions.len() as i64;
        let page = sessions
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn earliest_ended(&self) -> Result<Option<GameSession>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|s| !s.is_open())
            .min_by_key(|s| (s.end_time, s.id)))
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<Vec<User>>,
}

impl InMemoryUserRepository {
    fn all(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    fn page(users: Vec<User>, params: &ListParams) -> (Vec<User>, i64) {
        let total = users.len() as i64;
        let page = users
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect();
        (page, total)
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == user.username) {
            return Err(UsernameTaken(user.username.clone()).into());
        }
        let created = User {
            id: users.len() as i64 + 1,
            ..user.clone()
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.all().into_iter().find(|u| u.id == id))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.all().into_iter().find(|u| u.username == username))
    }

    async fn update_daily_quota(&self, id: i64, minutes: i64) -> Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
            u.daily_quota_minutes = minutes;
            u.clone()
        }))
    }

    async fn delete_by_username(&self, username: &str) -> Result<bool> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.username != username);
        Ok(users.len() < before)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        Ok(Self::page(self.all(), params))
    }

    async fn list_above_quota(
        &self,
        minutes: i64,
        params: &ListParams,
    ) -> Result<(Vec<User>, i64)> {
        let users = self
            .all()
            .into_iter()
            .filter(|u| u.daily_quota_minutes > minutes)
            .collect();
        Ok(Self::page(users, params))
    }

    async fn lowest_quota(&self) -> Result<Option<User>> {
        Ok(self
            .all()
            .into_iter()
            .min_by_key(|u| (u.daily_quota_minutes, u.id)))
    }

    async fn highest_quota(&self) -> Result<Option<User>> {
        Ok(self
            .all()
            .into_iter()
            .min_by_key(|u| (-u.daily_quota_minutes, u.id)))
    }
}
