//! HTTP transport for live calls, replays and route fetches.

use std::sync::Arc;
use std::time::Duration;

use fieldsync_engine::outcome::extract_error_message;
use fieldsync_engine::{FilePart, HttpMethod, Outcome, ReplayBody, RouteDocument};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;

use super::ApiError;
use crate::session::Session;

/// Header carrying the action's client reference on every attempt.
pub const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Remote API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    probe_path: String,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<Session>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_path: "/health".to_string(),
            session,
        })
    }

    pub fn with_probe_path(mut self, path: impl Into<String>) -> Self {
        self.probe_path = path.into();
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a mutation and classify the answer.
    ///
    /// Transport failures and timeouts come back as a retryable [`Outcome`];
    /// `Err` means the request could not even be built from the body.
    pub async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: &ReplayBody,
        idempotency_key: Option<&str>,
    ) -> Result<Outcome, ApiError> {
        let mut request = self.authorize(self.http.request(to_method(method), self.url(endpoint)));
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY, key);
        }

        request = match body {
            ReplayBody::Json(value) => request.json(value),
            ReplayBody::Multipart { file, fields } => request.multipart(multipart_form(file, fields)?),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(endpoint, error = %e, "Request did not complete");
                return Ok(Outcome::transport(describe_transport_error(&e)));
            }
        };

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        tracing::debug!(%method, endpoint, status, "Remote answered");

        Ok(Outcome::from_status(status, &text))
    }

    /// Fetch one route.
    pub async fn fetch_route(&self, id: &str) -> Result<RouteDocument, ApiError> {
        let request = self.http.get(self.url(&format!("/routes/{}", id)));
        self.get_json(request).await
    }

    /// Fetch routes, optionally filtered by date and assigned worker.
    pub async fn fetch_routes(
        &self,
        date: Option<&str>,
        owner_id: Option<&str>,
    ) -> Result<Vec<RouteDocument>, ApiError> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(date) = date {
            query.push(("date", date));
        }
        if let Some(owner_id) = owner_id {
            query.push(("ownerId", owner_id));
        }

        let request = self.http.get(self.url("/routes")).query(&query);
        self.get_json(request).await
    }

    /// Whether the remote answers at all. Any HTTP response counts.
    pub async fn probe(&self) -> bool {
        self.http.get(self.url(&self.probe_path)).send().await.is_ok()
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_error_message(status.as_u16(), &text),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
    }
}

fn multipart_form(file: &FilePart, fields: &[(String, String)]) -> Result<Form, ApiError> {
    let part = Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(&file.mime)
        .map_err(|e| ApiError::Request(format!("invalid mime type {:?}: {}", file.mime, e)))?;

    let form = fields
        .iter()
        .fold(Form::new(), |form, (name, value)| {
            form.text(name.clone(), value.clone())
        })
        .part(file.field_name.clone(), part);

    Ok(form)
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "could not reach the server".to_string()
    } else {
        e.to_string()
    }
}
