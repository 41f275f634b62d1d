//! Streaming chat core for Converse
//!
//! Normalizes the `OpenAI` Chat Completions, `OpenAI` Responses, Anthropic
//! Messages and Google Gemini streaming protocols into one chunk stream,
//! with bounded tool-calling loops, reasoning extraction, prompt-emulated
//! tool use for models without native function calling, usage accounting
//! and cancellation.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod dispatcher;
pub mod error;
pub mod images;
pub mod keys;
pub mod prompt_tools;
pub mod protocol;
pub mod provider;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use dispatcher::{ChatService, VendorKind};
pub use error::{LlmError, is_abort_error};
pub use images::{FsImageResolver, ImageResolver};
pub use keys::KeyRotator;
pub use prompt_tools::PromptToolAdapter;
pub use provider::{ChatAdapter, ChunkStream};
pub use transport::{HttpTransport, Transport, join_url, parse_sse_line};
pub use types::{ChatParams, ChatStreamChunk, Message, TokenUsage, ToolDefinition, ToolExecutor};
