//! Open session guard
//!
//! The one place that asks the store which sessions a user has open. Each
//! accounting operation classifies exactly once and branches on the result.

use crate::db::repositories::SessionRepository;
use crate::models::GameSession;
use anyhow::Result;
use std::sync::Arc;

/// Open sessions found for a user
#[derive(Debug, Clone, PartialEq)]
pub enum OpenSessions {
    None,
    One(GameSession),
    /// Two or more; the store is corrupted
    Many(Vec<GameSession>),
}

/// Classifies a user's open sessions with a single store query.
pub struct OpenSessionGuard {
    session_repo: Arc<dyn SessionRepository>,
}

impl OpenSessionGuard {
    pub fn new(session_repo: Arc<dyn SessionRepository>) -> Self {
        Self { session_repo }
    }

    pub async fn classify(&self, user_id: i64) -> Result<OpenSessions> {
        let mut open = self.session_repo.find_open_by_user(user_id).await?;
        Ok(match open.len() {
            0 => OpenSessions::None,
            1 => OpenSessions::One(open.remove(0)),
            _ => OpenSessions::Many(open),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::InMemorySessionRepository;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_classify() {
        let repo = Arc::new(InMemorySessionRepository::default());
        let guard = OpenSessionGuard::new(repo.clone());
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        assert_eq!(guard.classify(1).await.unwrap(), OpenSessions::None);

        repo.insert_raw(GameSession::open(1, "chess", start));
        match guard.classify(1).await.unwrap() {
            OpenSessions::One(session) => assert_eq!(session.game_name, "chess"),
            other => panic!("Expected one open session, got {:?}", other),
        }

        repo.insert_raw(GameSession::open(1, "go", start));
        match guard.classify(1).await.unwrap() {
            OpenSessions::Many(sessions) => assert_eq!(sessions.len(), 2),
            other => panic!("Expected many open sessions, got {:?}", other),
        }

        // Other users are unaffected
        assert_eq!(guard.classify(2).await.unwrap(), OpenSessions::None);
    }

    #[tokio::test]
    async fn test_classify_issues_one_query() {
        let repo = Arc::new(InMemorySessionRepository::default());
        let guard = OpenSessionGuard::new(repo.clone());

        guard.classify(1).await.unwrap();
        assert_eq!(repo.open_queries(), 1);
    }
}
