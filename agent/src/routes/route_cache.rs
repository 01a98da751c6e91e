//! Read-through route endpoints.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use fieldsync_engine::CachedRoute;
use serde::Deserialize;

use crate::cache::Fetched;
use crate::error::{AppError, Result};
use crate::AppState;

/// Query for GET /routes.
#[derive(Debug, Deserialize)]
pub struct RoutesQuery {
    pub date: Option<String>,
    pub owner: Option<String>,
}

/// Create route cache routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/{id}", get(get_route))
}

/// GET /routes
async fn list_routes(
    State(state): State<AppState>,
    Query(query): Query<RoutesQuery>,
) -> Result<Json<Fetched<Vec<CachedRoute>>>> {
    let fetched = state
        .cache
        .routes(query.date.as_deref(), query.owner.as_deref())
        .await?;
    Ok(Json(fetched))
}

/// GET /routes/{id}
async fn get_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Fetched<CachedRoute>>> {
    state
        .cache
        .route(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("route {}", id)))
}
