//! Fieldsync Agent - the on-device half of offline-first sync.
//!
//! Keeps a durable queue of mutations the promoter made while offline,
//! replays it in order once the remote API is reachable, and mirrors routes
//! so they can be browsed without coverage. The PWA shell talks to it over a
//! loopback HTTP API.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod notify;
pub mod remote;
pub mod routes;
pub mod session;
pub mod sync;

use std::sync::Arc;

use axum::Router;
use fieldsync_engine::Timestamp;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::RouteCache;
use crate::connectivity::Connectivity;
use crate::db::Pool;
use crate::notify::Notifier;
use crate::remote::ApiClient;
use crate::session::Session;
use crate::sync::SyncEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub engine: Arc<SyncEngine>,
    pub cache: RouteCache,
    pub connectivity: Arc<Connectivity>,
    pub notifier: Arc<Notifier>,
    pub session: Arc<Session>,
}

impl AppState {
    /// Wire the components around a store and a remote client.
    pub fn new(pool: Pool, client: ApiClient, connectivity: Arc<Connectivity>) -> Self {
        let notifier = Notifier::new_shared();
        let session = Arc::clone(client.session());
        let engine = SyncEngine::new_shared(
            pool.clone(),
            client.clone(),
            Arc::clone(&connectivity),
            Arc::clone(&notifier),
        );
        let cache = RouteCache::new(pool.clone(), client, Arc::clone(&connectivity));

        Self {
            pool,
            engine,
            cache,
            connectivity,
            notifier,
            session,
        }
    }
}

/// Build the loopback API router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}
