//! `OpenAI` Chat Completions wire format types

use serde::{Deserialize, Serialize};

// -- Request types --

/// Streaming chat completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Always true for this client
    pub stream: bool,
    /// Ask for a trailing usage chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Output token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Reasoning effort for reasoning models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<&'static str>,
    /// Function and built-in tools
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    /// xAI live search settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_parameters: Option<SearchParameters>,
    /// `OpenAI` search-model settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<WebSearchOptions>,
}

/// `OpenAI` search-model settings, sent empty to enable search
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebSearchOptions {}

/// Stream options
#[derive(Debug, Clone, Serialize)]
pub struct StreamOptions {
    /// Emit a final chunk with usage
    pub include_usage: bool,
}

/// xAI live search settings
#[derive(Debug, Clone, Serialize)]
pub struct SearchParameters {
    /// `auto`, `on` or `off`
    pub mode: &'static str,
}

/// Chat message
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// `system`, `user`, `assistant` or `tool`
    pub role: &'static str,
    /// Text or parts; null for tool-call-only assistant turns
    pub content: Option<ChatContent>,
    /// Tool calls made by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    /// Call answered by a tool message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Message content
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    /// Plain text
    Text(String),
    /// Text and image parts
    Parts(Vec<ChatContentPart>),
}

/// Content part
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    /// Text part
    Text {
        /// The text
        text: String,
    },
    /// Image part
    ImageUrl {
        /// Image location
        image_url: ImageUrl,
    },
}

/// Image location
#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    /// URL or data URI
    pub url: String,
    /// Detail hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Tool call on an assistant message
#[derive(Debug, Clone, Serialize)]
pub struct ChatToolCall {
    /// Call identifier
    pub id: String,
    /// Always `function`
    #[serde(rename = "type")]
    pub call_type: &'static str,
    /// Function invocation
    pub function: ChatFunctionCall,
}

/// Function invocation
#[derive(Debug, Clone, Serialize)]
pub struct ChatFunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

// -- Streaming types --

/// One streamed chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    /// Choices; empty on the trailing usage chunk
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Usage, on the final chunk when requested
    #[serde(default)]
    pub usage: Option<ChatUsage>,
    /// Error reported mid-stream by some compatible servers
    #[serde(default)]
    pub error: Option<ChatError>,
}

/// Streamed choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    /// Incremental message fields
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental message fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    /// Answer text
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning text (DeepSeek, Qwen, vLLM)
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// Reasoning text (OpenRouter, Ollama)
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Tool call fragments
    #[serde(default)]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

/// Tool call fragment
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkToolCall {
    /// Position of the call within the message
    #[serde(default)]
    pub index: usize,
    /// Call id, on the first fragment
    #[serde(default)]
    pub id: Option<String>,
    /// Function fragment
    #[serde(default)]
    pub function: Option<ChunkFunction>,
}

/// Function fragment
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkFunction {
    /// Name, on the first fragment
    #[serde(default)]
    pub name: Option<String>,
    /// Next slice of the JSON arguments
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Token usage
#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    /// Input tokens
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub completion_tokens: u64,
    /// Input breakdown
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    /// Output breakdown
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

/// Input token breakdown
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTokensDetails {
    /// Tokens served from cache
    #[serde(default)]
    pub cached_tokens: u64,
}

/// Output token breakdown
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionTokensDetails {
    /// Tokens spent reasoning
    #[serde(default)]
    pub reasoning_tokens: u64,
}

/// Error object
#[derive(Debug, Clone, Deserialize)]
pub struct ChatError {
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}
