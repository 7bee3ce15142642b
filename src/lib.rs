//! Playtime - game session accounting with daily quotas
//!
//! Tracks one continuous play session per player, splits sessions that cross
//! midnight (UTC) into day-bounded records and checks a per-player daily
//! quota when a session starts.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
