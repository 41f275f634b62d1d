//! `OpenAI` Responses API wire format types

use serde::{Deserialize, Serialize};

// -- Request types --

/// Streaming responses request
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    /// Model identifier
    pub model: String,
    /// Conversation items
    pub input: Vec<InputItem>,
    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Always true for this client
    pub stream: bool,
    /// Output token limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Reasoning settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    /// Function and built-in tools
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
}

/// Reasoning settings
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningConfig {
    /// Effort level
    pub effort: &'static str,
    /// Ask for a streamed reasoning summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'static str>,
}

/// Item in the `input` array
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    /// User, assistant or developer message
    Message {
        /// Message role
        role: &'static str,
        /// Content parts
        content: Vec<InputContent>,
    },
    /// Function call made by the assistant in an earlier round
    FunctionCall {
        /// Call identifier
        call_id: String,
        /// Function name
        name: String,
        /// JSON-encoded arguments
        arguments: String,
    },
    /// Output of a function call
    FunctionCallOutput {
        /// Call identifier
        call_id: String,
        /// Tool output
        output: String,
    },
}

/// Message content part
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    /// User text
    InputText {
        /// The text
        text: String,
    },
    /// User image
    InputImage {
        /// URL or data URI
        image_url: String,
        /// Detail hint
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Earlier assistant text
    OutputText {
        /// The text
        text: String,
    },
}

// -- Streaming types --

/// Server-sent event, discriminated by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesEvent {
    /// Answer text fragment
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        /// Text fragment
        delta: String,
    },
    /// Reasoning summary fragment
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta {
        /// Text fragment
        delta: String,
    },
    /// Raw reasoning fragment
    #[serde(rename = "response.reasoning_text.delta")]
    ReasoningTextDelta {
        /// Text fragment
        delta: String,
    },
    /// Output item started
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Position in the output array
        output_index: usize,
        /// The item
        item: OutputItem,
    },
    /// Output item finished
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        /// Position in the output array
        output_index: usize,
        /// The item
        item: OutputItem,
    },
    /// Function call arguments fragment
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        /// Position in the output array
        output_index: usize,
        /// JSON fragment
        delta: String,
    },
    /// Response finished
    #[serde(rename = "response.completed")]
    Completed {
        /// Final response
        response: ResponseBody,
    },
    /// Response failed
    #[serde(rename = "response.failed")]
    Failed {
        /// Final response carrying the error
        response: ResponseBody,
    },
    /// Stream-level error
    #[serde(rename = "error")]
    Error {
        /// Human-readable message
        #[serde(default)]
        message: String,
    },
    /// Events this client does not use
    #[serde(other)]
    Other,
}

/// Output item
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    /// Function call
    #[serde(rename = "function_call")]
    FunctionCall {
        /// Call identifier
        #[serde(default)]
        call_id: String,
        /// Function name
        #[serde(default)]
        name: String,
        /// JSON arguments, complete on `output_item.done`
        #[serde(default)]
        arguments: String,
    },
    /// Messages, reasoning and built-in tool items
    #[serde(other)]
    Other,
}

/// Response object in terminal events
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBody {
    /// Token usage
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
    /// Failure details
    #[serde(default)]
    pub error: Option<ResponseError>,
}

/// Token usage
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Input breakdown
    #[serde(default)]
    pub input_tokens_details: Option<InputTokensDetails>,
    /// Output breakdown
    #[serde(default)]
    pub output_tokens_details: Option<OutputTokensDetails>,
}

/// Input token breakdown
#[derive(Debug, Clone, Deserialize)]
pub struct InputTokensDetails {
    /// Tokens served from cache
    #[serde(default)]
    pub cached_tokens: u64,
}

/// Output token breakdown
#[derive(Debug, Clone, Deserialize)]
pub struct OutputTokensDetails {
    /// Tokens spent reasoning
    #[serde(default)]
    pub reasoning_tokens: u64,
}

/// Failure details
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}
