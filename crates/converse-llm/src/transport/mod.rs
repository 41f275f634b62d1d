//! Streaming HTTP transport
//!
//! Adapters hand a [`StreamRequest`] to a [`Transport`] and read the response
//! back as trimmed, non-empty text lines. The transport is injected, so a host
//! can wrap [`HttpTransport`] (for example to add its own proxy handling) and
//! still fall back to it.

mod client;
mod lines;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use converse_config::ProxyConfig;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use self::client::HttpTransport;
pub use self::lines::LineDecoder;
use crate::error::LlmError;

/// Response body as raw byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// A JSON POST expecting an event-stream response
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Target URL
    pub url: String,
    /// Request headers, including auth
    pub headers: HeaderMap,
    /// JSON body
    pub body: Value,
    /// Forward proxy to route through
    pub proxy: Option<ProxyConfig>,
    /// Aborts the request while it is in flight
    pub cancel: CancellationToken,
}

/// Streaming response whose body has not been read yet
pub struct StreamResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ByteStream,
}

impl StreamResponse {
    /// Wrap a status, headers and body stream
    pub fn new(status: StatusCode, headers: HeaderMap, body: ByteStream) -> Self {
        Self { status, headers, body }
    }

    /// Response status
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Read the whole body as text
    ///
    /// Used for error responses so the vendor's diagnostic is preserved.
    pub async fn text(mut self) -> Result<String, LlmError> {
        let mut raw = Vec::new();
        while let Some(chunk) = self.body.next().await {
            raw.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Body as decoded lines
    ///
    /// Firing `cancel` ends the sequence with [`LlmError::Aborted`].
    pub fn lines(self, cancel: CancellationToken) -> impl Stream<Item = Result<String, LlmError>> + Send {
        let mut body = self.body;

        async_stream::try_stream! {
            let mut decoder = LineDecoder::new();
            loop {
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    chunk = body.next() => Some(chunk),
                };

                match next {
                    None => Err::<(), _>(LlmError::Aborted)?,
                    Some(None) => break,
                    Some(Some(chunk)) => {
                        for line in decoder.push(&chunk?) {
                            yield line;
                        }
                    }
                }
            }

            if let Some(line) = decoder.finish() {
                yield line;
            }
        }
    }
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends streaming requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request.body` and return once response headers arrive
    async fn post_json_stream(&self, request: StreamRequest) -> Result<StreamResponse, LlmError>;
}

/// Payload of an SSE `data:` line
///
/// Returns `None` for comments, other fields and the `[DONE]` sentinel.
pub fn parse_sse_line(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?.trim();
    (!payload.is_empty() && payload != "[DONE]").then_some(payload)
}

/// Join a base URL and a path with exactly one slash
///
/// Any path prefix already on the base (an API gateway mount, `/v1`) is kept.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{path}")
    }
}
