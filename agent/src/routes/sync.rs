//! Manual "sync now".

use axum::{extract::State, routing::post, Json, Router};

use crate::sync::DrainOutcome;
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", post(sync_now))
}

/// POST /sync - Drain the queue and report what happened.
async fn sync_now(State(state): State<AppState>) -> Json<DrainOutcome> {
    Json(state.engine.drain().await)
}
