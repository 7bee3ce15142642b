//! Player service
//!
//! Registration, removal, self-service quota changes and read-only player
//! reports.

use crate::db::repositories::{UserRepository, UsernameTaken};
use crate::models::{ListParams, PagedResult, User};
use std::sync::Arc;

/// Longest accepted username
pub const MAX_USERNAME_LEN: usize = 50;

/// Error types for player service operations
#[derive(Debug, thiserror::Error)]
pub enum PlayerServiceError {
    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username already registered
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Player not found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Player service for managing players and their daily quotas
pub struct PlayerService {
    user_repo: Arc<dyn UserRepository>,
    default_daily_quota_minutes: i64,
}

impl PlayerService {
    /// Create a new player service
    ///
    /// `default_daily_quota_minutes` applies when a player registers
    /// without a quota.
    pub fn new(user_repo: Arc<dyn UserRepository>, default_daily_quota_minutes: i64) -> Self {
        Self {
            user_repo,
            default_daily_quota_minutes,
        }
    }

    /// Register a new player
    pub async fn register(
        &self,
        username: &str,
        daily_quota_minutes: Option<i64>,
    ) -> Result<User, PlayerServiceError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(PlayerServiceError::ValidationError(
                "username cannot be empty".to_string(),
            ));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(PlayerServiceError::ValidationError(format!(
                "username cannot be longer than {} characters",
                MAX_USERNAME_LEN
            )));
        }

        if self.user_repo.get_by_username(username).await?.is_some() {
            return Err(taken(username));
        }

        let quota = daily_quota_minutes.unwrap_or(self.default_daily_quota_minutes);
        let user = self
            .user_repo
            .create(&User::new(username, quota))
            .await
            .map_err(|err| match err.downcast_ref::<UsernameTaken>() {
                Some(_) => taken(username),
                None => PlayerServiceError::InternalError(err),
            })?;

        tracing::info!(
            "Registered player '{}' with a daily quota of {} minutes",
            user.username,
            user.daily_quota_minutes
        );
        Ok(user)
    }

    /// Set the caller's own daily quota
    pub async fn update_daily_quota(
        &self,
        caller: &str,
        minutes: i64,
    ) -> Result<User, PlayerServiceError> {
        let user = self
            .user_repo
            .get_by_username(caller)
            .await?
            .ok_or_else(|| not_found(format!("player '{}'", caller)))?;

        let updated = self
            .user_repo
            .update_daily_quota(user.id, minutes)
            .await?
            .ok_or_else(|| not_found(format!("player '{}'", caller)))?;

        tracing::info!(
            "Player '{}' changed daily quota from {} to {} minutes",
            updated.username,
            user.daily_quota_minutes,
            updated.daily_quota_minutes
        );
        Ok(updated)
    }

    /// Look a player up by username
    pub async fn find_by_username(&self, username: &str) -> Result<User, PlayerServiceError> {
        self.user_repo
            .get_by_username(username.trim())
            .await?
            .ok_or_else(|| not_found(format!("player '{}'", username.trim())))
    }

    /// Remove a player together with their recorded sessions.
    ///
    /// The caller must be a registered player.
    pub async fn remove(&self, caller: &str, username: &str) -> Result<(), PlayerServiceError> {
        self.find_by_username(caller).await?;

        let username = username.trim();
        if !self.user_repo.delete_by_username(username).await? {
            return Err(not_found(format!("player '{}'", username)));
        }

        tracing::info!("Player '{}' removed player '{}'", caller, username);
        Ok(())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, PlayerServiceError> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| not_found(format!("player {}", id)))
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<User>, PlayerServiceError> {
        let (items, total) = self.user_repo.list(params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Players whose daily quota is strictly above `minutes`
    pub async fn users_above_quota(
        &self,
        minutes: i64,
        params: &ListParams,
    ) -> Result<PagedResult<User>, PlayerServiceError> {
        let (items, total) = self.user_repo.list_above_quota(minutes, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn lowest_quota(&self) -> Result<User, PlayerServiceError> {
        self.user_repo
            .lowest_quota()
            .await?
            .ok_or_else(|| not_found("no players found".to_string()))
    }

    pub async fn highest_quota(&self) -> Result<User, PlayerServiceError> {
        self.user_repo
            .highest_quota()
            .await?
            .ok_or_else(|| not_found("no players found".to_string()))
    }
}

fn taken(username: &str) -> PlayerServiceError {
    PlayerServiceError::ConflictError(format!("username '{}' is already taken", username))
}

fn not_found(what: String) -> PlayerServiceError {
    PlayerServiceError::NotFoundError(what)
}
