//! Player API endpoints
//!
//! Handles HTTP requests for players:
//! - POST /api/v1/players - Register a player
//! - PUT /api/v1/players/me/quota - Set the caller's daily quota
//! - GET /api/v1/players - Paginated list
//! - GET /api/v1/players/{id}
//! - GET /api/v1/players/by-username/{username}
//! - DELETE /api/v1/players/by-username/{username} - Remove a player and their sessions
//! - GET /api/v1/players/above/{minutes} - Quota strictly above a value
//! - GET /api/v1/players/lowest-quota
//! - GET /api/v1/players/highest-quota

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, Caller};
use crate::models::{PagedResult, User};

/// Request body for registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    /// Falls back to the configured default when absent
    pub daily_quota_minutes: Option<i64>,
}

/// Request body for a quota change
#[derive(Debug, Deserialize)]
pub struct UpdateQuotaRequest {
    pub daily_quota_minutes: i64,
}

/// Response for a single player
#[derive(Debug, Serialize)]
pub struct PlayerResponse {
    pub id: i64,
    pub username: String,
    pub daily_quota_minutes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PlayerResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            daily_quota_minutes: user.daily_quota_minutes,
            created_at: user.created_at,
        }
    }
}

/// Response for player lists
#[derive(Debug, Serialize)]
pub struct PlayerListResponse {
    pub players: Vec<PlayerResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl From<PagedResult<User>> for PlayerListResponse {
    fn from(result: PagedResult<User>) -> Self {
        Self {
            total_pages: result.total_pages(),
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            players: result.items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Public routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", post(register).get(list_players))
        .route("/lowest-quota", get(lowest_quota))
        .route("/highest-quota", get(highest_quota))
        .route("/above/{minutes}", get(players_above_quota))
        .route("/by-username/{username}", get(find_player))
        .route("/{id}", get(get_player))
}

/// Routes that act on the caller
pub fn caller_router() -> Router<AppState> {
    Router::new()
        .route("/me/quota", put(update_quota))
        .route("/by-username/{username}", delete(remove_player))
}

/// POST /api/v1/players
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PlayerResponse>), ApiError> {
    let user = state
        .player_service
        .register(&body.username, body.daily_quota_minutes)
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// PUT /api/v1/players/me/quota
async fn update_quota(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(body): Json<UpdateQuotaRequest>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let user = state
        .player_service
        .update_daily_quota(&caller, body.daily_quota_minutes)
        .await?;
    Ok(Json(user.into()))
}

/// GET /api/v1/players
async fn list_players(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PlayerListResponse>, ApiError> {
    let result = state.player_service.list(&query.params()).await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/players/{id}
async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let user = state.player_service.get_by_id(id).await?;
    Ok(Json(user.into()))
}

/// GET /api/v1/players/by-username/{username}
async fn find_player(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let user = state.player_service.find_by_username(&username).await?;
    Ok(Json(user.into()))
}

/// DELETE /api/v1/players/by-username/{username}
async fn remove_player(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.player_service.remove(&caller, &username).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/players/above/{minutes}
async fn players_above_quota(
    State(state): State<AppState>,
    Path(minutes): Path<i64>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PlayerListResponse>, ApiError> {
    let result = state
        .player_service
        .users_above_quota(minutes, &query.params())
        .await?;
    Ok(Json(result.into()))
}

/// GET /api/v1/players/lowest-quota
async fn lowest_quota(State(state): State<AppState>) -> Result<Json<PlayerResponse>, ApiError> {
    let user = state.player_service.lowest_quota().await?;
    Ok(Json(user.into()))
}

/// GET /api/v1/players/highest-quota
async fn highest_quota(State(state): State<AppState>) -> Result<Json<PlayerResponse>, ApiError> {
    let user = state.player_service.highest_quota().await?;
    Ok(Json(user.into()))
}
