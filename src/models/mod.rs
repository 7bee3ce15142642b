//! Data models
//!
//! This module contains the data structures used throughout the playtime service:
//! - Database entities (GameSession, User)
//! - Pagination parameters and results

mod pagination;
mod session;
mod user;

pub use pagination::{ListParams, PagedResult};
pub use session::{GameSession, SessionState};
pub use user::User;
