//! Shared fixtures: a scripted stand-in for the remote API and a wired agent
//! on a temporary SQLite file.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fieldsync_agent::connectivity::Connectivity;
use fieldsync_agent::db::{self, Pool};
use fieldsync_agent::remote::ApiClient;
use fieldsync_agent::session::Session;
use fieldsync_agent::AppState;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const TOKEN: &str = "test-token";

/// A request the mock remote received.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub idempotency_key: Option<String>,
    pub authorization: Option<String>,
    pub json: Option<Value>,
    pub file_name: Option<String>,
    pub file_len: Option<usize>,
    pub fields: Vec<(String, String)>,
}

#[derive(Default)]
struct MockState {
    requests: Vec<Recorded>,
    scripted: HashMap<String, VecDeque<(u16, Value)>>,
    routes: Vec<Value>,
    reads_fail: bool,
}

/// Scripted remote API. Unscripted mutations answer 201.
#[derive(Clone, Default)]
pub struct MockRemote {
    inner: Arc<Mutex<MockState>>,
}

impl MockRemote {
    /// Queue the next answers for `path`.
    pub fn script(&self, path: &str, status: u16, body: Value) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .entry(path.to_string())
            .or_default()
            .push_back((status, body));
    }

    pub fn add_route(&self, route: Value) {
        self.inner.lock().unwrap().routes.push(route);
    }

    /// Make route reads answer 503.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().reads_fail = fail;
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    fn next_answer(&self, path: &str) -> (u16, Value) {
        self.inner
            .lock()
            .unwrap()
            .scripted
            .get_mut(path)
            .and_then(|answers| answers.pop_front())
            .unwrap_or((201, json!({"ok": true})))
    }

    fn record(&self, request: Recorded) {
        self.inner.lock().unwrap().requests.push(request);
    }

    /// Serve on an ephemeral loopback port and return the base URL.
    pub async fn spawn(&self) -> String {
        let router = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/routes", get(list_routes))
            .route("/routes/{id}", get(get_route))
            .fallback(mutation)
            .layer(DefaultBodyLimit::disable())
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        format!("http://{}", addr)
    }
}

#[derive(Deserialize)]
struct RoutesQuery {
    date: Option<String>,
}

async fn list_routes(State(mock): State<MockRemote>, Query(query): Query<RoutesQuery>) -> Response {
    let state = mock.inner.lock().unwrap();
    if state.reads_fail {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }
    let routes: Vec<Value> = state
        .routes
        .iter()
        .filter(|r| match &query.date {
            Some(date) => r["date"].as_str().is_some_and(|d| d.starts_with(date.as_str())),
            None => true,
        })
        .cloned()
        .collect();
    Json(routes).into_response()
}

async fn get_route(State(mock): State<MockRemote>, Path(id): Path<String>) -> Response {
    let state = mock.inner.lock().unwrap();
    if state.reads_fail {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }
    match state.routes.iter().find(|r| r["id"] == id.as_str()) {
        Some(route) => Json(route.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "route not found"}))).into_response(),
    }
}

async fn mutation(State(mock): State<MockRemote>, request: Request) -> Response {
    let (mut recorded, content_type) = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let recorded = Recorded {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            idempotency_key: header("idempotency-key"),
            authorization: header("authorization"),
            ..Recorded::default()
        };
        (recorded, header("content-type"))
    };

    let is_multipart = content_type.is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(request, &()).await.unwrap();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    recorded.file_name = Some(file_name);
                    recorded.file_len = Some(field.bytes().await.unwrap().len());
                }
                None => recorded.fields.push((name, field.text().await.unwrap())),
            }
        }
    } else {
        let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        recorded.json = serde_json::from_slice(&bytes).ok();
    }

    let (status, body) = mock.next_answer(&recorded.path);
    mock.record(recorded);

    (StatusCode::from_u16(status).unwrap(), Json(body)).into_response()
}

/// An agent wired to a mock remote, on a store in a temp directory.
pub struct Harness {
    pub dir: TempDir,
    pub database_url: String,
    pub base_url: String,
    pub mock: MockRemote,
    pub state: AppState,
}

impl Harness {
    pub async fn new(online: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let database_url = format!("sqlite://{}", dir.path().join("agent.db").display());
        let mock = MockRemote::default();
        let base_url = mock.spawn().await;
        let state = build_state(&database_url, &base_url, online).await;

        Self {
            dir,
            database_url,
            base_url,
            mock,
            state,
        }
    }

    /// Simulate a process restart: close the store and wire everything anew
    /// on the same file.
    pub async fn restart(&mut self, online: bool) {
        self.state.pool.close().await;
        self.state = build_state(&self.database_url, &self.base_url, online).await;
    }

    pub fn pool(&self) -> &Pool {
        &self.state.pool
    }

    pub fn go_online(&self) {
        self.state.connectivity.set_online(true);
    }

    pub async fn pending(&self) -> i64 {
        self.state.engine.pending_count().await.unwrap()
    }

    /// Poll until the queue is empty or give up after a few seconds.
    pub async fn wait_until_drained(&self) {
        for _ in 0..100 {
            if self.pending().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        panic!("queue never drained");
    }
}

async fn build_state(database_url: &str, base_url: &str, online: bool) -> AppState {
    let pool = db::create_pool(database_url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let session = Session::new_shared(Some(TOKEN.to_string()));
    let client = ApiClient::new(base_url, session, Duration::from_secs(5)).unwrap();

    AppState::new(pool, client, Connectivity::new_shared(online))
}

/// A route with items A and B, as the remote returns it.
pub fn route_doc(id: &str, date: &str) -> Value {
    json!({
        "id": id,
        "date": date,
        "ownerId": "emp-1",
        "status": "OPEN",
        "items": [
            {"id": "A", "status": "PENDING", "store": "North"},
            {"id": "B", "status": "PENDING", "store": "South"}
        ]
    })
}
