//! Local HTTP fixture server.
//!
//! Stands in for both the order API and the artifact host: each path is
//! mapped to a canned response, and hits are counted so tests can assert how
//! many transfers actually happened.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Canned response for one path.
#[derive(Debug, Clone)]
pub enum FixtureResponse {
    Json(Value),
    Bytes(Vec<u8>),
    Text(String),
    Status(u16),
    /// Empty `200 OK` carrying an `ETag`, as S3 answers an upload.
    Etag(String),
    /// Respond only after a delay (for timeout tests).
    Delayed(Duration, Box<FixtureResponse>),
}

impl FixtureResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Json(value) => axum::Json(value).into_response(),
            Self::Bytes(data) => (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                data,
            )
                .into_response(),
            Self::Text(text) => text.into_response(),
            Self::Status(code) => StatusCode::from_u16(code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
            Self::Etag(tag) => (StatusCode::OK, [(header::ETAG, tag)]).into_response(),
            Self::Delayed(_, inner) => inner.into_response(),
        }
    }
}

/// One request as the fixture server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Raw query string, if any (`acl` for an S3 ACL request).
    pub query: Option<String>,
    /// Header values keyed by lowercase name.
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

#[derive(Default)]
struct FixtureState {
    routes: Mutex<HashMap<String, FixtureResponse>>,
    hits: Mutex<HashMap<String, usize>>,
    authorization: Mutex<HashMap<String, String>>,
    requests: Mutex<HashMap<String, Vec<RecordedRequest>>>,
}

/// HTTP server bound to `127.0.0.1` on an ephemeral port.
///
/// The server task is aborted on drop.
pub struct FixtureServer {
    addr: SocketAddr,
    state: Arc<FixtureState>,
    handle: JoinHandle<()>,
}

impl FixtureServer {
    pub async fn start() -> Self {
        let state = Arc::new(FixtureState::default());
        let app = Router::new().fallback(respond).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fixture server");
        let addr = listener.local_addr().expect("Fixture server has no address");

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Server origin without a trailing slash, usable as an endpoint.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Register (or replace) the response for a path, optionally `path?query`.
    pub fn set(&self, path: &str, response: FixtureResponse) {
        self.state
            .routes
            .lock()
            .expect("fixture routes poisoned")
            .insert(normalize(path), response);
    }

    pub fn set_json(&self, path: &str, value: Value) {
        self.set(path, FixtureResponse::Json(value));
    }

    pub fn set_bytes(&self, path: &str, data: Vec<u8>) {
        self.set(path, FixtureResponse::Bytes(data));
    }

    /// Number of requests received for a path.
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .expect("fixture hits poisoned")
            .get(&normalize(path))
            .copied()
            .unwrap_or(0)
    }

    /// `Authorization` header of the most recent request for a path.
    pub fn last_authorization(&self, path: &str) -> Option<String> {
        self.state
            .authorization
            .lock()
            .expect("fixture auth poisoned")
            .get(&normalize(path))
            .cloned()
    }

    /// Every request received for a path, oldest first.
    pub fn requests(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .expect("fixture requests poisoned")
            .get(&normalize(path))
            .cloned()
            .unwrap_or_default()
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

async fn respond(
    State(state): State<Arc<FixtureState>>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let path = uri.path().to_string();

    let recorded = RecordedRequest {
        method: method.to_string(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect(),
    };
    state
        .requests
        .lock()
        .expect("fixture requests poisoned")
        .entry(path.clone())
        .or_default()
        .push(recorded);

    *state
        .hits
        .lock()
        .expect("fixture hits poisoned")
        .entry(path.clone())
        .or_insert(0) += 1;

    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        state
            .authorization
            .lock()
            .expect("fixture auth poisoned")
            .insert(path.clone(), value.to_string());
    }

    // `path?query` routes take precedence over the bare path
    let response = {
        let routes = state.routes.lock().expect("fixture routes poisoned");
        uri.query()
            .and_then(|query| routes.get(&format!("{}?{}", path, query)))
            .or_else(|| routes.get(&path))
            .cloned()
    };

    match response {
        Some(FixtureResponse::Delayed(delay, inner)) => {
            tokio::time::sleep(delay).await;
            inner.into_response()
        }
        Some(response) => response.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_serves_and_counts() {
        let server = FixtureServer::start().await;
        server.set_json("orders/1", json!({"state": "success"}));
        server.set("broken", FixtureResponse::Status(503));

        let client = reqwest::Client::new();
        let body: Value = client
            .get(server.url("orders/1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["state"], "success");

        let status = client.get(server.url("broken")).send().await.unwrap().status();
        assert_eq!(status.as_u16(), 503);

        let missing = client.get(server.url("nope")).send().await.unwrap().status();
        assert_eq!(missing.as_u16(), 404);

        assert_eq!(server.hits("orders/1"), 1);
        assert_eq!(server.hits("/broken"), 1);
        assert_eq!(server.hits("never"), 0);
    }

    #[tokio::test]
    async fn test_records_method_query_and_headers() {
        let server = FixtureServer::start().await;
        server.set("bucket/k.csv", FixtureResponse::Etag("\"abc\"".to_string()));

        let response = reqwest::Client::new()
            .put(format!("{}/bucket/k.csv?acl", server.base_url()))
            .header("x-amz-acl", "public-read")
            .body("")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers()["etag"], "\"abc\"");

        let requests = server.requests("bucket/k.csv");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].query.as_deref(), Some("acl"));
        assert_eq!(requests[0].header("X-Amz-Acl"), Some("public-read"));
    }
}
