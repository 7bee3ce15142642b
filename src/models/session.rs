//! Game session model
//!
//! A game session is one continuous play interval for one player and one game.
//! A session without an end time is "open"; it becomes "closed" exactly once,
//! when its end time and duration are recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Game session entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    /// Unique identifier (0 until the store assigns one)
    pub id: i64,
    /// Name of the game being played
    pub game_name: String,
    /// Owning user ID
    pub user_id: i64,
    /// When play started
    pub start_time: DateTime<Utc>,
    /// When play ended; `None` while the session is open
    pub end_time: Option<DateTime<Utc>>,
    /// Whole minutes played, meaningful once `end_time` is set
    pub duration_minutes: i64,
}

impl GameSession {
    /// Create a new open session that has not been persisted yet
    pub fn open(user_id: i64, game_name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            game_name: game_name.into(),
            user_id,
            start_time,
            end_time: None,
            duration_minutes: 0,
        }
    }

    /// Create a session that is already closed
    pub fn closed(
        user_id: i64,
        game_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Self {
        Self {
            id: 0,
            game_name: game_name.into(),
            user_id,
            start_time,
            end_time: Some(end_time),
            duration_minutes,
        }
    }

    /// Check if the session has not been closed yet
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Check if the session has been persisted
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Record the end of play
    pub fn close(&mut self, end_time: DateTime<Utc>, duration_minutes: i64) {
        self.end_time = Some(end_time);
        self.duration_minutes = duration_minutes;
    }

    /// Lifecycle state derived from the end time
    pub fn state(&self) -> SessionState {
        if self.is_open() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }
}

/// Session lifecycle state. There is no transition out of `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Closed,
}
