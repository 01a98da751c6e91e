//! Health and status endpoints.

use axum::{extract::State, routing::get, Json, Router};
use fieldsync_engine::Notification;
use serde::Serialize;

use crate::error::Result;
use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// What the pending badge and toast area show.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub online: bool,
    pub authenticated: bool,
    pub pending: i64,
    pub last_notification: Option<Notification>,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
}

/// Health check handler.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    Ok(Json(StatusResponse {
        online: state.connectivity.is_online(),
        authenticated: state.session.is_authenticated(),
        pending: state.engine.pending_count().await?,
        last_notification: state.notifier.last(),
    }))
}
