//! Vendor adapters and the machinery they share

pub mod anthropic;
pub mod capabilities;
pub mod format;
pub mod google;
pub mod openai;
pub mod overrides;
pub mod tool_loop;

use std::pin::Pin;

use futures_util::Stream;
use reqwest::header::HeaderMap;
use serde::Serialize;

use crate::error::LlmError;
use crate::types::{ChatParams, ChatStreamChunk};

pub use anthropic::ClaudeAdapter;
pub use google::GeminiAdapter;
pub use openai::OpenAiAdapter;

use self::overrides::{apply_body_overrides, apply_header_overrides};
use self::tool_loop::PreparedRequest;

/// Lazily produced chat output
///
/// Nothing is sent until the stream is first polled, and it cannot be
/// restarted: retrying means calling the adapter again.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatStreamChunk, LlmError>> + Send>>;

/// A vendor protocol exposed as a chunk stream
pub trait ChatAdapter: Send + Sync {
    /// Adapter name for logs
    fn name(&self) -> &'static str;

    /// Start streaming a response for `params`
    fn send_stream(&self, params: ChatParams) -> ChunkStream;
}

/// Encode a vendor request and apply configured and caller overrides
pub(crate) fn finish_request<T: Serialize>(
    params: &ChatParams,
    url: String,
    mut headers: HeaderMap,
    request: &T,
) -> Result<PreparedRequest, LlmError> {
    let mut body = serde_json::to_value(request).map_err(|e| LlmError::Internal(e.into()))?;
    apply_body_overrides(&mut body, &params.provider, &params.extra_body);
    apply_header_overrides(&mut headers, &params.provider, &params.extra_headers);
    Ok(PreparedRequest { url, headers, body })
}
