use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use converse_config::ProviderConfig;
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::message::Message;
use super::tool::{ToolDefinition, ToolExecutor};

/// Default upper bound on tool-calling rounds
pub const DEFAULT_MAX_TOOL_LOOP_ITERATIONS: usize = 10;

/// Pre-encoded image attached to the latest user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserImage {
    /// MIME type, e.g. `image/png`
    pub mime: String,
    /// Base64 payload without a `data:` prefix
    pub base64: String,
}

impl UserImage {
    /// `data:` URI for this image
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

/// Everything needed to stream one chat request
#[derive(Clone)]
pub struct ChatParams {
    /// Provider to talk to
    pub provider: Arc<ProviderConfig>,
    /// Model identifier
    pub model: String,
    /// Conversation so far
    pub messages: Vec<Message>,
    /// Images for the latest user message
    pub user_images: Vec<UserImage>,
    /// Local image files, resolved by the dispatcher when `user_images` is empty
    pub image_paths: Vec<PathBuf>,
    /// Reasoning budget: `0` disables, negative lets the vendor decide
    pub thinking_budget: Option<i64>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    pub top_p: Option<f64>,
    /// Output token limit
    pub max_tokens: Option<u32>,
    /// Upper bound on tool-calling rounds
    pub max_tool_loop_iterations: usize,
    /// Tools offered to the model
    pub tools: Vec<ToolDefinition>,
    /// Runs requested tools
    pub tool_executor: Option<Arc<dyn ToolExecutor>>,
    /// Headers overriding computed and configured ones
    pub extra_headers: IndexMap<String, String>,
    /// Body fields overriding computed and configured ones; values are coerced
    pub extra_body: IndexMap<String, String>,
    /// Key chosen for this request; the provider's first key otherwise
    pub api_key: Option<SecretString>,
    /// Emulate tool calling through the system prompt
    pub prompt_tool_use: bool,
    /// Cancels the request and any running tool
    pub cancel: CancellationToken,
}

impl ChatParams {
    /// Parameters with defaults for everything but provider, model and messages
    pub fn new(provider: Arc<ProviderConfig>, model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            provider,
            model: model.into(),
            messages,
            user_images: Vec::new(),
            image_paths: Vec::new(),
            thinking_budget: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            max_tool_loop_iterations: DEFAULT_MAX_TOOL_LOOP_ITERATIONS,
            tools: Vec::new(),
            tool_executor: None,
            extra_headers: IndexMap::new(),
            extra_body: IndexMap::new(),
            api_key: None,
            prompt_tool_use: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Offer tools and the executor that runs them
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>, executor: Arc<dyn ToolExecutor>) -> Self {
        self.tools = tools;
        self.tool_executor = Some(executor);
        self
    }

    /// Set the reasoning budget
    #[must_use]
    pub const fn with_thinking_budget(mut self, budget: i64) -> Self {
        self.thinking_budget = Some(budget);
        self
    }

    /// Set the tool round limit
    #[must_use]
    pub const fn with_max_tool_loop_iterations(mut self, iterations: usize) -> Self {
        self.max_tool_loop_iterations = iterations;
        self
    }

    /// Use the given cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Key to authenticate with
    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref().or_else(|| self.provider.api_keys.first())
    }
}

impl fmt::Debug for ChatParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatParams")
            .field("provider", &self.provider.id)
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("user_images", &self.user_images.len())
            .field("thinking_budget", &self.thinking_budget)
            .field("max_tool_loop_iterations", &self.max_tool_loop_iterations)
            .field("tools", &self.tools.len())
            .field("has_tool_executor", &self.tool_executor.is_some())
            .field("prompt_tool_use", &self.prompt_tool_use)
            .finish_non_exhaustive()
    }
}
