//! In-memory transport for adapter tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::error::LlmError;
use crate::transport::{StreamRequest, StreamResponse, Transport};
use crate::types::ChatStreamChunk;

/// Canned response for one request
#[derive(Debug, Clone)]
pub struct Script {
    status: StatusCode,
    body: String,
}

/// Replays scripted responses and records every request
#[derive(Debug)]
pub struct ScriptedTransport {
    scripts: Mutex<Vec<Script>>,
    repeat: Option<Script>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedTransport {
    /// Answer requests with `scripts` in order
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().rev().collect()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answer every request with the same script
    pub fn repeating(script: Script) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(Vec::new()),
            repeat: Some(script),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Successful SSE response with one `data:` line per payload
    pub fn sse(payloads: &[&str]) -> Script {
        let mut body: String = payloads.iter().map(|p| format!("data: {p}\n\n")).collect();
        body.push_str("data: [DONE]\n\n");
        Script {
            status: StatusCode::OK,
            body,
        }
    }

    /// Error response
    pub fn error(status: u16, body: &str) -> Script {
        Script {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_owned(),
        }
    }

    /// Number of requests received
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Body of the most recent request
    pub fn last_body(&self) -> serde_json::Value {
        self.requests.lock().unwrap().last().unwrap().body.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json_stream(&self, request: StreamRequest) -> Result<StreamResponse, LlmError> {
        self.requests.lock().unwrap().push(request);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop()
            .or_else(|| self.repeat.clone())
            .expect("no scripted response left");

        // Split mid-line so parsers see partial reads
        let bytes = script.body.into_bytes();
        let chunks: Vec<Result<Bytes, LlmError>> = bytes.chunks(7).map(|c| Ok(Bytes::copy_from_slice(c))).collect();

        Ok(StreamResponse::new(script.status, HeaderMap::new(), Box::pin(stream::iter(chunks))))
    }
}

/// Drain a chunk stream, stopping at the first error
pub async fn collect<S>(stream: S) -> Result<Vec<ChatStreamChunk>, LlmError>
where
    S: Stream<Item = Result<ChatStreamChunk, LlmError>>,
{
    let mut stream = std::pin::pin!(stream);
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk?);
    }
    Ok(chunks)
}

/// Concatenated content of a chunk list
pub fn content(chunks: &[ChatStreamChunk]) -> String {
    chunks.iter().filter_map(|c| c.content.as_deref()).collect()
}

/// Concatenated reasoning of a chunk list
pub fn reasoning(chunks: &[ChatStreamChunk]) -> String {
    chunks.iter().filter_map(|c| c.reasoning.as_deref()).collect()
}
