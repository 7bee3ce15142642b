//! User model
//!
//! Players are owned by the identity layer; this crate reads them to resolve
//! callers and to look up their daily playtime quota.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity representing a registered player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique). This is the caller identity string.
    pub username: String,
    /// Maximum minutes of play per calendar day.
    ///
    /// May be zero or negative, which blocks every new session once any
    /// time has been recorded for the day.
    pub daily_quota_minutes: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user that has not been persisted yet
    pub fn new(username: impl Into<String>, daily_quota_minutes: i64) -> Self {
        Self {
            id: 0, // Will be set by the database
            username: username.into(),
            daily_quota_minutes,
            created_at: Utc::now(),
        }
    }
}
