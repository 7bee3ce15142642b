//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod session;
pub mod user;

pub use session::{
    OpenSessionConflict, SessionAlreadyClosed, SessionRepository, SqlxSessionRepository,
};
pub use user::{SqlxUserRepository, UserRepository, UsernameTaken};
