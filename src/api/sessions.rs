//! Game session API endpoints
//!
//! Caller operations (identity header required):
//! - POST /api/v1/sessions/start - Open a session now
//! - POST /api/v1/sessions/start-backdated - Open a session that began earlier
//! - POST /api/v1/sessions/end - Close the open session
//! - GET /api/v1/sessions/current - Minutes in the open session
//! - GET /api/v1/sessions/today - Minutes recorded today
//! - GET /api/v1/sessions/day/{date} - Minutes recorded on a day
//!
//! Reports:
//! - GET /api/v1/sessions - Paginated, newest first
//! - GET /api/v1/sessions/{id}
//! - GET /api/v1/sessions/alphabetical
//! - GET /api/v1/sessions/started
//! - GET /api/v1/sessions/earliest

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_per_page, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, Caller};
use crate::models::{GameSession, ListParams, PagedResult, SessionState};
use crate::services::parse_day;

/// Request body for starting a session
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub game_name: String,
}

/// Request body for starting a backdated session
#[derive(Debug, Deserialize)]
pub struct StartBackdatedSessionRequest {
    pub game_name: String,
    pub started_at: DateTime<Utc>,
}

/// Query parameters for the session list
#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Keep only sessions longer than this many minutes
    pub duration_above: Option<i64>,
}

/// Response for a single session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: i64,
    pub game_name: String,
    pub user_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub state: SessionState,
}

impl From<GameSession> for SessionResponse {
    fn from(session: GameSession) -> Self {
        Self {
            state: session.state(),
            id: session.id,
            game_name: session.game_name,
            user_id: session.user_id,
            start_time: session.start_time,
            end_time: session.end_time,
            duration_minutes: session.duration_minutes,
        }
    }
}

/// Response for session lists
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
    pub page: u32,
    pub per_page: u32,
    /// Only present for the full listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
}

impl SessionListResponse {
    fn paged(result: PagedResult<GameSession>) -> Self {
        let total_pages = result.total_pages();
        Self {
            page: result.page,
            per_page: result.per_page,
            total: Some(result.total),
            total_pages: Some(total_pages),
            sessions: result.items.into_iter().map(Into::into).collect(),
        }
    }

    fn page_view(sessions: Vec<GameSession>, params: &ListParams) -> Self {
        Self {
            sessions: sessions.into_iter().map(Into::into).collect(),
            page: params.page,
            per_page: params.per_page,
            total: None,
            total_pages: None,
        }
    }
}

/// Response for the open session's elapsed time
#[derive(Debug, Serialize)]
pub struct CurrentDurationResponse {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
}

/// Response for a day total
#[derive(Debug, Serialize)]
pub struct PlaytimeResponse {
    pub date: NaiveDate,
    pub minutes: i64,
}

/// Routes that act on the caller's own sessions
pub fn caller_router() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_session))
        .route("/start-backdated", post(start_backdated_session))
        .route("/end", post(end_session))
        .route("/current", get(current_duration))
        .route("/today", get(today_playtime))
        .route("/day/{date}", get(day_playtime))
}

/// Reporting routes
pub fn report_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/alphabetical", get(list_alphabetical))
        .route("/started", get(list_by_start_time))
        .route("/earliest", get(earliest_session))
        .route("/{id}", get(get_session))
}

/// POST /api/v1/sessions/start
async fn start_session(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(body): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = state
        .session_service
        .start_session(&caller, &body.game_name)
        .await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// POST /api/v1/sessions/start-backdated
async fn start_backdated_session(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Json(body): Json<StartBackdatedSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let session = state
        .session_service
        .start_backdated_session(&caller, &body.game_name, body.started_at)
        .await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// POST /api/v1/sessions/end
async fn end_session(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.session_service.end_session(&caller).await?;
    Ok(Json(session.into()))
}

/// GET /api/v1/sessions/current
async fn current_duration(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<CurrentDurationResponse>, ApiError> {
    let minutes = state.session_service.current_duration(&caller).await?;
    Ok(Json(CurrentDurationResponse {
        active: minutes.is_some(),
        minutes,
    }))
}

/// GET /api/v1/sessions/today
async fn today_playtime(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<PlaytimeResponse>, ApiError> {
    let (date, minutes) = state.session_service.today_playtime(&caller).await?;
    Ok(Json(PlaytimeResponse { date, minutes }))
}

/// GET /api/v1/sessions/day/{date}
async fn day_playtime(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(date): Path<String>,
) -> Result<Json<PlaytimeResponse>, ApiError> {
    let date = parse_day(&date).map_err(|e| ApiError::validation_error(e.to_string()))?;
    let minutes = state
        .session_service
        .total_playtime_for_day(&caller, date)
        .await?;
    Ok(Json(PlaytimeResponse { date, minutes }))
}

/// GET /api/v1/sessions
async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);

    let response = match query.duration_above {
        Some(minutes) => SessionListResponse::page_view(
            state
                .query_service
                .with_duration_above(minutes, &params)
                .await?,
            &params,
        ),
        None => SessionListResponse::paged(state.query_service.list(&params).await?),
    };
    Ok(Json(response))
}

/// GET /api/v1/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.query_service.get_by_id(id).await?;
    Ok(Json(session.into()))
}

/// GET /api/v1/sessions/alphabetical
async fn list_alphabetical(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let params = query.params();
    let sessions = state.query_service.sorted_by_game_name(&params).await?;
    Ok(Json(SessionListResponse::page_view(sessions, &params)))
}

/// GET /api/v1/sessions/started
async fn list_by_start_time(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let params = query.params();
    let sessions = state.query_service.sorted_by_start_time(&params).await?;
    Ok(Json(SessionListResponse::page_view(sessions, &params)))
}

/// GET /api/v1/sessions/earliest
async fn earliest_session(
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state.query_service.earliest().await?;
    Ok(Json(session.into()))
}
