//! JSON web API module.
//!
//! Thin glue over the registry: every handler reads already-materialized
//! sensor state or forwards a control call, so no request ever waits on
//! hardware I/O.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::registry::Registry;

/// Creates the web router with all routes.
pub fn create_router(registry: Arc<Registry>) -> Router {
    // The dashboard is served from another origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/pressures", get(pressures))
        .route("/api/status", get(status))
        .route("/api/temperature", get(temperature))
        .route("/api/temperature/reset", post(reset_max))
        .route("/api/laser/on", post(laser_on))
        .route("/api/laser/off", post(laser_off))
        .layer(cors)
        .with_state(registry)
}

/// GET /api/pressures - current reading of every gauge
async fn pressures(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    Json(registry.pressures())
}

/// GET /api/status - display string per device
async fn status(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    Json(registry.status())
}

/// GET /api/temperature - pyrometer snapshot
async fn temperature(State(registry): State<Arc<Registry>>) -> Response {
    match registry.temperature() {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (StatusCode::NOT_FOUND, "no pyrometer configured").into_response(),
    }
}

/// POST /api/temperature/reset - zero the running maximum
async fn reset_max(State(registry): State<Arc<Registry>>) -> StatusCode {
    if registry.reset_max() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// POST /api/laser/on - switch the rangefinder laser on
async fn laser_on(State(registry): State<Arc<Registry>>) -> StatusCode {
    if registry.laser_on().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// POST /api/laser/off - switch the rangefinder laser off
async fn laser_off(State(registry): State<Arc<Registry>>) -> StatusCode {
    if registry.laser_off().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
