//! HTTP mock server for integration testing.
//!
//! Provides an HTTP server that mimics the Voyage `/v1/embeddings` endpoint
//! so the full request/response cycle can be tested without real API calls.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::testing::fixtures::hashed_embedding;

/// Function turning one input text into a vector of the requested length.
pub type EmbedFn = Arc<dyn Fn(&str, usize) -> Vec<f32> + Send + Sync>;

/// A request body as received by the mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub input: Vec<String>,
    pub model: String,
    #[serde(default)]
    pub truncation: Option<bool>,
    #[serde(default)]
    pub output_dimension: Option<usize>,
    #[serde(default)]
    pub input_type: Option<String>,
    /// Authorization header value, filled in by the server.
    #[serde(skip)]
    pub authorization: Option<String>,
}

struct ServerState {
    embed_fn: EmbedFn,
    api_key: Option<String>,
    reverse_order: bool,
    default_dimension: usize,
    failures: Mutex<VecDeque<(StatusCode, serde_json::Value)>>,
    requests: Mutex<Vec<CapturedRequest>>,
}

/// An HTTP mock server for embedding API testing.
///
/// Starts a local HTTP server that answers embedding requests using a
/// pluggable embedding function. Failures can be queued to exercise error
/// paths.
///
/// # Example
///
/// ```ignore
/// use cinevec_embed::testing::MockEmbeddingServer;
///
/// let server = MockEmbeddingServer::start().await;
/// let config = VoyageConfig::new("test-key").with_base_url(server.url());
///
/// server.shutdown().await;
/// ```
pub struct MockEmbeddingServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Builder for [`MockEmbeddingServer`].
pub struct MockEmbeddingServerBuilder {
    embed_fn: EmbedFn,
    api_key: Option<String>,
    reverse_order: bool,
    default_dimension: usize,
}

impl MockEmbeddingServerBuilder {
    /// Answer with vectors computed by `f`.
    pub fn embed_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, usize) -> Vec<f32> + Send + Sync + 'static,
    {
        self.embed_fn = Arc::new(f);
        self
    }

    /// Reject requests whose bearer token differs from `key`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Return data items in reverse order (each still tagged with its index).
    pub fn reverse_order(mut self, reverse: bool) -> Self {
        self.reverse_order = reverse;
        self
    }

    /// Dimension used when the request does not specify one.
    pub fn default_dimension(mut self, dimension: usize) -> Self {
        self.default_dimension = dimension;
        self
    }

    pub async fn start(self) -> MockEmbeddingServer {
        MockEmbeddingServer::start_with_state(ServerState {
            embed_fn: self.embed_fn,
            api_key: self.api_key,
            reverse_order: self.reverse_order,
            default_dimension: self.default_dimension,
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
        .await
    }
}

impl MockEmbeddingServer {
    /// Start a server with hashed embeddings and no auth check.
    pub async fn start() -> Self {
        Self::builder().start().await
    }

    pub fn builder() -> MockEmbeddingServerBuilder {
        MockEmbeddingServerBuilder {
            embed_fn: Arc::new(hashed_embedding),
            api_key: None,
            reverse_order: false,
            default_dimension: 1024,
        }
    }

    async fn start_with_state(state: ServerState) -> Self {
        let state = Arc::new(state);

        let app = Router::new()
            .route("/v1/embeddings", post(handle_embeddings))
            .with_state(Arc::clone(&state));

        // Bind to a random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to get local address");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Get the server's base URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make the next request fail with `status` and a `{"detail": ...}` body.
    pub fn queue_failure(&self, status: u16, detail: impl Into<String>) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "detail": detail.into() });
        self.state.failures.lock().unwrap().push_back((status, body));
    }

    /// Get captured requests.
    pub fn captured_requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Assert that exactly N requests were made.
    pub fn assert_request_count(&self, expected: usize) {
        let actual = self.request_count();
        assert_eq!(
            actual, expected,
            "Expected {} requests, but got {}",
            expected, actual
        );
    }

    /// Shutdown the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockEmbeddingServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Handle POST /v1/embeddings
async fn handle_embeddings(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(mut request): Json<CapturedRequest>,
) -> impl IntoResponse {
    request.authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.requests.lock().unwrap().push(request.clone());

    if let Some(expected) = &state.api_key {
        let presented = request
            .authorization
            .as_deref()
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(expected.as_str()) {
            let body = serde_json::json!({ "detail": "Provided API key is invalid." });
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }
    }

    let failure = state.failures.lock().unwrap().pop_front();
    if let Some((status, body)) = failure {
        return (status, Json(body)).into_response();
    }

    let dimension = request.output_dimension.unwrap_or(state.default_dimension);
    let mut data: Vec<serde_json::Value> = request
        .input
        .iter()
        .enumerate()
        .map(|(index, text)| {
            serde_json::json!({
                "object": "embedding",
                "embedding": (state.embed_fn)(text, dimension),
                "index": index,
            })
        })
        .collect();
    if state.reverse_order {
        data.reverse();
    }

    let total_tokens: usize = request
        .input
        .iter()
        .map(|t| t.split_whitespace().count())
        .sum();

    let body = serde_json::json!({
        "object": "list",
        "data": data,
        "model": request.model,
        "usage": { "total_tokens": total_tokens },
    });
    (StatusCode::OK, Json(body)).into_response()
}
