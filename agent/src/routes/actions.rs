//! Producer entry point and queue inspection.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use fieldsync_engine::{ActionId, ActionState, NewAction};
use serde::Deserialize;

use crate::db::{self, QueueEntry};
use crate::error::{AppError, Result};
use crate::sync::PerformOutcome;
use crate::AppState;

/// Query for GET /actions.
#[derive(Debug, Deserialize)]
pub struct ActionsQuery {
    /// Comma separated states; all unresolved states when absent
    pub state: Option<String>,
}

/// Create action routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/actions", get(list_actions).post(perform_action))
        .route("/actions/{id}", delete(discard_action))
}

/// GET /actions - Queued actions, oldest first.
///
/// Rows that no longer decode are listed without a payload.
async fn list_actions(
    State(state): State<AppState>,
    Query(query): Query<ActionsQuery>,
) -> Result<Json<Vec<QueueEntry>>> {
    let states = parse_states(query.state.as_deref())?;
    let entries = db::list_queue_entries(&state.pool, &states).await?;
    Ok(Json(entries))
}

/// POST /actions - Perform a mutation live or queue it.
async fn perform_action(
    State(state): State<AppState>,
    Json(action): Json<NewAction>,
) -> (StatusCode, Json<PerformOutcome>) {
    let outcome = state.engine.perform(action).await;
    let status = match &outcome {
        PerformOutcome::Applied { .. } => StatusCode::OK,
        PerformOutcome::Queued { .. } => StatusCode::ACCEPTED,
        PerformOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PerformOutcome::Invalid { .. } => StatusCode::BAD_REQUEST,
        PerformOutcome::NotSaved { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(outcome))
}

/// DELETE /actions/{id} - Discard an action after inspection.
async fn discard_action(
    State(state): State<AppState>,
    Path(id): Path<ActionId>,
) -> Result<StatusCode> {
    if db::delete_action(&state.pool, id).await? {
        tracing::info!(action_id = id, "Action discarded");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("action {}", id)))
    }
}

fn parse_states(raw: Option<&str>) -> Result<Vec<ActionState>> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(ActionState::UNRESOLVED.to_vec());
    };

    raw.split(',')
        .map(|s| s.trim().parse::<ActionState>().map_err(AppError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_filter() {
        assert_eq!(parse_states(None).unwrap(), ActionState::UNRESOLVED.to_vec());
        assert_eq!(
            parse_states(Some("pending, error")).unwrap(),
            vec![ActionState::Pending, ActionState::Error]
        );
        assert!(parse_states(Some("done")).is_err());
    }
}
