//! Mock vendor backend for integration tests
//!
//! Serves scripted SSE or error bodies on the `OpenAI`, Anthropic and Gemini
//! streaming endpoints and records every request it receives.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Router, routing};
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

/// Canned reply for one request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// `data:` events followed by end of body
    Sse(Vec<String>),
    /// `data:` events, then the body never ends
    Stall(Vec<String>),
    /// Non-success status with a raw body
    Error(u16, String),
}

impl MockReply {
    /// SSE reply from JSON payloads
    pub fn sse(events: &[serde_json::Value]) -> Self {
        Self::Sse(events.iter().map(ToString::to_string).collect())
    }

    /// SSE reply terminated by the `[DONE]` sentinel
    pub fn sse_done(events: &[serde_json::Value]) -> Self {
        let mut events: Vec<String> = events.iter().map(ToString::to_string).collect();
        events.push("[DONE]".to_owned());
        Self::Sse(events)
    }

    /// Error reply
    pub fn error(status: u16, body: &str) -> Self {
        Self::Error(status, body.to_owned())
    }
}

/// Request as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path and query
    pub path: String,
    /// Request headers
    pub headers: HeaderMap,
    /// Parsed JSON body
    pub body: serde_json::Value,
}

impl RecordedRequest {
    /// Header value as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

struct MockState {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Running mock vendor
pub struct MockVendor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockVendor {
    /// Start a mock answering requests with `replies` in order
    pub async fn start(replies: Vec<MockReply>) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle))
            .route("/v1/responses", routing::post(handle))
            .route("/v1/messages", routing::post(handle))
            .route("/v1beta/models/{model_action}", routing::post(handle))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for `OpenAI` and Anthropic providers
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for Gemini providers
    pub fn gemini_base_url(&self) -> String {
        format!("http://{}/v1beta", self.addr)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Number of requests received
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let path = uri.path_and_query().map_or_else(|| uri.path().to_owned(), ToString::to_string);
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.requests.lock().unwrap().push(RecordedRequest { path, headers, body });

    let Some(reply) = state.replies.lock().unwrap().pop_front() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "no scripted reply left").into_response();
    };

    match reply {
        MockReply::Sse(events) => sse_response(Body::from_stream(events_stream(events))),
        MockReply::Stall(events) => {
            let stalled = events_stream(events).chain(stream::pending());
            sse_response(Body::from_stream(stalled))
        }
        MockReply::Error(status, body) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, body).into_response()
        }
    }
}

fn events_stream(events: Vec<String>) -> impl futures_util::Stream<Item = Result<Bytes, Infallible>> + Send {
    stream::iter(events.into_iter().map(|event| Ok(Bytes::from(format!("data: {event}\n\n")))))
}

fn sse_response(body: Body) -> Response {
    ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
}
