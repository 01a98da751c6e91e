//! HTTP route definitions for the loopback control API.

mod actions;
mod health;
mod route_cache;
mod session;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(sync::routes())
        .merge(actions::routes())
        .merge(route_cache::routes())
        .merge(session::routes())
}
