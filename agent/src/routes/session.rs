//! Re-authentication.

use axum::{extract::State, http::StatusCode, routing::put, Json, Router};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub token: String,
}

/// Create session routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/session", put(install_token).delete(sign_out))
}

/// PUT /session - Install a fresh token and replay what piled up.
async fn install_token(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<StatusCode> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("token must not be empty".to_string()));
    }

    state.session.set_token(token);
    state.engine.trigger();
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /session
async fn sign_out(State(state): State<AppState>) -> StatusCode {
    state.session.invalidate();
    StatusCode::NO_CONTENT
}
