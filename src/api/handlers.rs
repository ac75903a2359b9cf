use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::consumer::LatestCache;

/// Application state shared across handlers
pub struct AppState {
    pub cache: Arc<LatestCache>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub has_rollup: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        has_rollup: !state.cache.is_empty(),
    })
}

// ============================================================================
// Rollups
// ============================================================================

/// Latest consumed rollup, byte for byte as it was read from the broker
pub async fn latest_rollup(State(state): State<Arc<AppState>>) -> Response {
    match state.cache.latest() {
        Some(latest) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            latest.payload.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// 405 for methods a route would otherwise answer implicitly
pub async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET")]).into_response()
}
