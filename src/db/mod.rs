//! Database layer
//!
//! Storage for players and their game sessions. Two backends are supported:
//! - SQLite (default, single file or in-memory)
//! - MySQL
//!
//! The driver is chosen from configuration and hidden behind the
//! `DatabasePool` trait; repositories dispatch on `DatabasePool::driver()`
//! to pick the SQL dialect.
//!
//! # Usage
//!
//! ```ignore
//! use playtime::config::DatabaseConfig;
//! use playtime::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
