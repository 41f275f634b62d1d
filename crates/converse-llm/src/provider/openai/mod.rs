//! `OpenAI` and OpenAI-compatible providers
//!
//! Routes each request to the Responses API or Chat Completions depending on
//! the provider's `use_responses_api` flag. Both protocols share message
//! normalization and the tool loop.

mod chat;
mod responses;

use std::collections::BTreeMap;
use std::sync::Arc;

use converse_config::ProviderConfig;
use url::Url;

pub use chat::{ChatCompletionsProtocol, ChatParser};
pub use responses::{ResponsesParser, ResponsesProtocol};

use super::tool_loop;
use super::{ChatAdapter, ChunkStream};
use crate::transport::Transport;
use crate::types::{ChatParams, ToolCall};

/// `OpenAI` adapter
pub struct OpenAiAdapter {
    transport: Arc<dyn Transport>,
}

impl OpenAiAdapter {
    /// Create an adapter sending through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl ChatAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn send_stream(&self, params: ChatParams) -> ChunkStream {
        let transport = Arc::clone(&self.transport);
        if params.provider.use_responses_api {
            Box::pin(tool_loop::run(Arc::new(ResponsesProtocol), transport, params))
        } else {
            Box::pin(tool_loop::run(Arc::new(ChatCompletionsProtocol), transport, params))
        }
    }
}

/// Tool call assembled from streamed fragments
#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Completed calls in stream order, dropping nameless fragments
fn finish_calls(calls: BTreeMap<usize, PartialCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .filter(|(_, call)| !call.name.is_empty())
        .map(|(index, call)| ToolCall {
            id: if call.id.is_empty() { format!("call_{index}") } else { call.id },
            name: call.name,
            arguments: call.arguments,
        })
        .collect()
}

/// Lowercased host of a base URL
fn host(base_url: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
}

/// Mistral rejects `stream_options`
fn is_mistral(provider: &ProviderConfig) -> bool {
    host(&provider.base_url).is_some_and(|host| host.contains("mistral.ai"))
}

/// Endpoint served by xAI
pub(crate) fn is_xai_host(provider: &ProviderConfig) -> bool {
    host(&provider.base_url).is_some_and(|host| host == "x.ai" || host.ends_with(".x.ai"))
}

/// xAI endpoint or Grok model, which take `search_parameters`
fn is_grok(provider: &ProviderConfig, model: &str) -> bool {
    is_xai_host(provider) || model.to_ascii_lowercase().contains("grok")
}
