//! API layer - HTTP handlers and routing
//!
//! A thin JSON surface over the services. It includes:
//! - Session endpoints (start, end, current duration, day totals, reports)
//! - Player endpoints (registration, quota, reports)
//! - Health check

pub mod common;
pub mod middleware;
pub mod players;
pub mod sessions;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, Caller};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Routes that act on behalf of the caller
    let caller_routes = Router::new()
        .nest("/sessions", sessions::caller_router())
        .nest("/players", players::caller_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_caller,
        ));

    // Public routes
    Router::new()
        .route("/health", get(health))
        .nest("/sessions", sessions::report_router())
        .nest("/players", players::public_router())
        .merge(caller_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let cors = cors_layer(cors_origin, state.caller_header.clone());

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: &str, caller_header: HeaderName) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, caller_header]);

    if origin == "*" {
        return cors.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
            cors
        }
    }
}

/// GET /api/v1/health
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state.pool.ping().await.map_err(|e| {
        tracing::error!("Health check failed: {:#}", e);
        ApiError::internal_error("Database unavailable")
    })?;
    Ok(Json(json!({ "status": "ok" })))
}
