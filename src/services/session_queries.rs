//! Session reporting queries
//!
//! Read-only views over recorded sessions. The sorted and filtered views
//! work on one page of the newest-first listing: they reorder or filter that
//! page, they do not sort the whole table.

use crate::db::repositories::SessionRepository;
use crate::models::{GameSession, ListParams, PagedResult};
use std::sync::Arc;

/// Error types for session query operations
#[derive(Debug, thiserror::Error)]
pub enum SessionQueryError {
    /// No matching session
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Store failure
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Reporting service over all recorded sessions
pub struct SessionQueryService {
    session_repo: Arc<dyn SessionRepository>,
}

impl SessionQueryService {
    /// Create a new session query service
    pub fn new(session_repo: Arc<dyn SessionRepository>) -> Self {
        Self { session_repo }
    }

    /// Sessions newest first
    pub async fn list(
        &self,
        params: &ListParams,
    ) -> Result<PagedResult<GameSession>, SessionQueryError> {
        let (items, total) = self.session_repo.list(params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<GameSession, SessionQueryError> {
        self.session_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| SessionQueryError::NotFoundError(format!("session {}", id)))
    }

    /// One page, ordered by game name
    pub async fn sorted_by_game_name(
        &self,
        params: &ListParams,
    ) -> Result<Vec<GameSession>, SessionQueryError> {
        let mut page = self.page(params).await?;
        page.sort_by(|a, b| a.game_name.cmp(&b.game_name));
        Ok(page)
    }

    /// One page, keeping sessions longer than `minutes`
    pub async fn with_duration_above(
        &self,
        minutes: i64,
        params: &ListParams,
    ) -> Result<Vec<GameSession>, SessionQueryError> {
        let mut page = self.page(params).await?;
        page.retain(|s| s.duration_minutes > minutes);
        Ok(page)
    }

    /// One page, ordered by start time
    pub async fn sorted_by_start_time(
        &self,
        params: &ListParams,
    ) -> Result<Vec<GameSession>, SessionQueryError> {
        let mut page = self.page(params).await?;
        page.sort_by_key(|s| s.start_time);
        Ok(page)
    }

    /// The closed session that ended first
    pub async fn earliest(&self) -> Result<GameSession, SessionQueryError> {
        self.session_repo
            .earliest_ended()
            .await?
            .ok_or_else(|| SessionQueryError::NotFoundError("no sessions found".to_string()))
    }

    async fn page(&self, params: &ListParams) -> Result<Vec<GameSession>, SessionQueryError> {
        Ok(self.session_repo.list(params).await?.0)
    }
}
