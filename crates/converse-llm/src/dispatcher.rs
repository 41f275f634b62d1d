//! Single entry point that routes chat requests to vendor adapters

use std::sync::Arc;

use converse_config::ProviderConfig;

use crate::error::LlmError;
use crate::images::{FsImageResolver, ImageResolver};
use crate::keys::KeyRotator;
use crate::prompt_tools::PromptToolAdapter;
use crate::provider::capabilities::ModelCapabilities;
use crate::provider::openai::is_xai_host;
use crate::provider::{ChatAdapter, ChunkStream, ClaudeAdapter, GeminiAdapter, OpenAiAdapter};
use crate::transport::{HttpTransport, Transport};
use crate::types::ChatParams;

/// Vendor protocol family a provider speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorKind {
    /// `OpenAI` Chat Completions or Responses, and compatible servers
    OpenAi,
    /// Anthropic Messages
    Claude,
    /// Google Gemini
    Google,
}

impl VendorKind {
    /// Classify by declared provider type, falling back to the provider id
    ///
    /// `x.ai` endpoints are always `OpenAi` whatever their declared type.
    pub fn classify(provider: &ProviderConfig) -> Result<Self, LlmError> {
        if is_xai_host(provider) {
            return Ok(Self::OpenAi);
        }

        Self::from_name(&provider.provider_type)
            .or_else(|| Self::from_name(&provider.id))
            .ok_or_else(|| LlmError::UnsupportedProvider {
                provider: provider.id.clone(),
                provider_type: provider.provider_type.clone(),
            })
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-response" | "openai-responses" | "openai-compatible" | "azure-openai" | "azure"
            | "xai" | "grok" | "mistral" | "deepseek" | "groq" | "openrouter" | "ollama" | "lmstudio"
            | "together" | "fireworks" | "perplexity" | "vllm" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Claude),
            "gemini" | "google" => Some(Self::Google),
            _ => None,
        }
    }
}

/// Routes requests to the matching adapter
///
/// Owns the transport, the key rotator and the image resolver, so one
/// service instance is shared by every request of an application.
pub struct ChatService {
    transport: Arc<dyn Transport>,
    keys: KeyRotator,
    images: Arc<dyn ImageResolver>,
}

impl Default for ChatService {
    fn default() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }
}

impl ChatService {
    /// Service sending through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            keys: KeyRotator::new(),
            images: Arc::new(FsImageResolver),
        }
    }

    /// Replace the resolver used for `image_paths`
    #[must_use]
    pub fn with_image_resolver(mut self, images: Arc<dyn ImageResolver>) -> Self {
        self.images = images;
        self
    }

    /// Adapter for a vendor kind
    pub fn adapter_for(&self, kind: VendorKind) -> Arc<dyn ChatAdapter> {
        let transport = Arc::clone(&self.transport);
        match kind {
            VendorKind::OpenAi => Arc::new(OpenAiAdapter::new(transport)),
            VendorKind::Claude => Arc::new(ClaudeAdapter::new(transport)),
            VendorKind::Google => Arc::new(GeminiAdapter::new(transport)),
        }
    }

    /// Start streaming a response
    ///
    /// Fails before any request is made when the provider kind is unknown or
    /// an image attachment cannot be loaded.
    pub async fn send_message_stream(&self, mut params: ChatParams) -> Result<ChunkStream, LlmError> {
        let kind = VendorKind::classify(&params.provider)?;
        params.provider = route_provider(&params.provider, kind);

        if params.api_key.is_none() {
            params.api_key = self.keys.select(&params.provider);
        }

        if params.user_images.is_empty() && !params.image_paths.is_empty() {
            for path in std::mem::take(&mut params.image_paths) {
                let image = self.images.resolve(&path).await?;
                params.user_images.push(image);
            }
        }

        let adapter = self.adapter_for(kind);
        let adapter: Arc<dyn ChatAdapter> = if uses_prompt_tools(&params) {
            Arc::new(PromptToolAdapter::new(adapter))
        } else {
            adapter
        };

        tracing::debug!(
            provider = %params.provider.id,
            kind = ?kind,
            adapter = adapter.name(),
            model = %params.model,
            "dispatching chat request"
        );

        Ok(adapter.send_stream(params))
    }
}

/// Provider config adjusted for the selected protocol
fn route_provider(provider: &Arc<ProviderConfig>, kind: VendorKind) -> Arc<ProviderConfig> {
    if kind != VendorKind::OpenAi {
        return Arc::clone(provider);
    }

    let responses = if is_xai_host(provider) {
        false
    } else {
        provider.use_responses_api || provider.provider_type.eq_ignore_ascii_case("openai-response")
    };

    if responses == provider.use_responses_api {
        return Arc::clone(provider);
    }

    let mut routed = ProviderConfig::clone(provider);
    routed.use_responses_api = responses;
    Arc::new(routed)
}

/// Whether tools go through the system prompt instead of the native API
fn uses_prompt_tools(params: &ChatParams) -> bool {
    if params.tools.is_empty() {
        return false;
    }

    let forced = params
        .provider
        .model_override(&params.model)
        .is_some_and(|o| o.prompt_tools);

    params.prompt_tool_use || forced || !ModelCapabilities::detect(&params.provider, &params.model).function_calling
}
