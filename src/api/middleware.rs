//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error body and its status mapping
//! - Caller resolution from the identity header set by the upstream gateway

use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::services::{
    DynClock, PlayerService, PlayerServiceError, SessionAccountingService, SessionQueryError,
    SessionQueryService, SessionServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub session_service: Arc<SessionAccountingService>,
    pub query_service: Arc<SessionQueryService>,
    pub player_service: Arc<PlayerService>,
    /// Header carrying the caller's username
    pub caller_header: HeaderName,
}

impl AppState {
    /// Wire the SQLx repositories and services over one pool
    pub fn new(
        pool: DynDatabasePool,
        clock: DynClock,
        default_daily_quota_minutes: i64,
        caller_header: HeaderName,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());

        Self {
            session_service: Arc::new(SessionAccountingService::new(
                session_repo.clone(),
                user_repo.clone(),
                clock,
            )),
            query_service: Arc::new(SessionQueryService::new(session_repo)),
            player_service: Arc::new(PlayerService::new(user_repo, default_daily_quota_minutes)),
            pool,
            caller_header,
        }
    }
}

/// Caller identity extracted from the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn inconsistent_state(message: impl Into<String>) -> Self {
        Self::new("INCONSISTENT_STATE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Store failures are logged here and reported without their cause
    fn from_internal(err: anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "OVER_QUOTA" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<SessionServiceError> for ApiError {
    fn from(err: SessionServiceError) -> Self {
        match err {
            SessionServiceError::ValidationError(msg) => Self::validation_error(msg),
            SessionServiceError::ConflictError(msg) => Self::conflict(msg),
            SessionServiceError::NotFoundError(msg) => Self::not_found(msg),
            SessionServiceError::InconsistentStateError(msg) => Self::inconsistent_state(msg),
            SessionServiceError::OverQuotaError {
                session_id,
                played_minutes,
                quota_minutes,
            } => Self::with_details(
                "OVER_QUOTA",
                format!(
                    "Daily quota exceeded: {} minutes played today, quota is {}",
                    played_minutes, quota_minutes
                ),
                serde_json::json!({
                    "session_id": session_id,
                    "played_minutes": played_minutes,
                    "quota_minutes": quota_minutes,
                }),
            ),
            SessionServiceError::InternalError(e) => Self::from_internal(e),
        }
    }
}

impl From<SessionQueryError> for ApiError {
    fn from(err: SessionQueryError) -> Self {
        match err {
            SessionQueryError::NotFoundError(msg) => Self::not_found(msg),
            SessionQueryError::InternalError(e) => Self::from_internal(e),
        }
    }
}

impl From<PlayerServiceError> for ApiError {
    fn from(err: PlayerServiceError) -> Self {
        match err {
            PlayerServiceError::ValidationError(msg) => Self::validation_error(msg),
            PlayerServiceError::ConflictError(msg) => Self::conflict(msg),
            PlayerServiceError::NotFoundError(msg) => Self::not_found(msg),
            PlayerServiceError::InternalError(e) => Self::from_internal(e),
        }
    }
}

/// Read the caller identity header
fn extract_caller(request: &Request, header: &HeaderName) -> Option<String> {
    request
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|caller| !caller.is_empty())
        .map(str::to_string)
}

/// Caller middleware
///
/// The upstream gateway has already authenticated the request; this only
/// requires that it says who the caller is.
pub async fn require_caller(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = extract_caller(&request, &state.caller_header).ok_or_else(|| {
        ApiError::unauthorized(format!("Missing caller identity header '{}'", state.caller_header))
    })?;

    request.extensions_mut().insert(Caller(caller));
    Ok(next.run(request).await)
}
