//! Anthropic Messages API wire format types

use serde::{Deserialize, Serialize};

// -- Request types --

/// Streaming messages request
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate (required by Anthropic)
    pub max_tokens: u32,
    /// System prompt (top-level, not in messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages
    pub messages: Vec<AnthropicMessage>,
    /// Always true for this client
    pub stream: bool,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Extended thinking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// Function tools and server tools
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
}

/// Extended thinking setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    /// Think with a token budget
    Enabled {
        /// Tokens reserved for thinking
        budget_tokens: u32,
    },
    /// No thinking
    Disabled,
}

/// Anthropic message
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    /// Role ("user" or "assistant")
    pub role: &'static str,
    /// Content blocks
    pub content: Vec<AnthropicContentBlock>,
}

/// Content block in an Anthropic message
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    /// Text content
    Text {
        /// The text string
        text: String,
    },
    /// Image content
    Image {
        /// Image source
        source: AnthropicImageSource,
    },
    /// Thinking replayed from an earlier assistant turn
    Thinking {
        /// Thinking text
        thinking: String,
        /// Signature proving the thinking is unmodified
        signature: String,
    },
    /// Tool use request from the assistant
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Tool input as JSON
        input: serde_json::Value,
    },
    /// Tool result from the user
    ToolResult {
        /// Tool use ID this result responds to
        tool_use_id: String,
        /// Result content
        content: String,
    },
}

/// Anthropic image source
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicImageSource {
    /// Inline image data
    Base64 {
        /// Media type (e.g. "image/png")
        media_type: String,
        /// Base64 payload
        data: String,
    },
    /// Remote image
    Url {
        /// Image URL
        url: String,
    },
}

// -- Streaming types --

/// Anthropic SSE event types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    /// Stream started
    MessageStart {
        /// Partial message with metadata
        message: AnthropicStreamMessage,
    },
    /// New content block started
    ContentBlockStart {
        /// Block index
        index: usize,
        /// Initial block content
        content_block: AnthropicStreamContentBlock,
    },
    /// Incremental content within a block
    ContentBlockDelta {
        /// Block index
        index: usize,
        /// Delta content
        delta: AnthropicStreamDelta,
    },
    /// Message metadata delta (stop reason, usage)
    MessageDelta {
        /// Updated usage
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    /// Error reported mid-stream
    Error {
        /// Error details
        error: AnthropicErrorDetail,
    },
    /// Block stops, message stop and pings
    #[serde(other)]
    Other,
}

/// Partial message in a `message_start` event
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicStreamMessage {
    /// Initial usage
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Content block in a `content_block_start` event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamContentBlock {
    /// Tool use block
    ToolUse {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
    },
    /// Text, thinking and server tool blocks
    #[serde(other)]
    Other,
}

/// Delta content in a `content_block_delta` event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamDelta {
    /// Incremental text
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// Incremental thinking
    ThinkingDelta {
        /// Thinking fragment
        thinking: String,
    },
    /// Thinking signature
    SignatureDelta {
        /// Signature
        signature: String,
    },
    /// Incremental tool input JSON
    InputJsonDelta {
        /// JSON fragment
        partial_json: String,
    },
    /// Citations and future delta kinds
    #[serde(other)]
    Other,
}

/// Anthropic token usage
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicUsage {
    /// Uncached input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Input tokens read from the prompt cache
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    /// Input tokens written to the prompt cache
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

/// Anthropic error detail
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicErrorDetail {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error message
    #[serde(default)]
    pub message: String,
}
