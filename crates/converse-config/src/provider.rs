use std::collections::HashMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::proxy::ProxyConfig;
use crate::rules::{BodyRuleConfig, HeaderRuleConfig};

/// Connection descriptor for a single chat provider
///
/// `provider_type` is kept as written in the file; classifying it into a
/// vendor protocol happens at dispatch time so unknown kinds can be reported
/// with the offending provider named.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Identifier, filled from the table key when loaded from a file
    #[serde(default)]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Declared provider kind, e.g. `openai`, `anthropic`, `gemini`
    #[serde(rename = "type", default)]
    pub provider_type: String,
    /// API base URL, including any gateway path prefix
    pub base_url: String,
    /// API keys; more than one enables rotation
    #[serde(default)]
    pub api_keys: Vec<SecretString>,
    /// How to pick among several API keys
    #[serde(default)]
    pub key_strategy: KeyStrategy,
    /// Path appended to `base_url` instead of the vendor default
    #[serde(default)]
    pub chat_path: Option<String>,
    /// Use the `OpenAI` Responses API instead of Chat Completions
    #[serde(default)]
    pub use_responses_api: bool,
    /// Per-model capability overrides keyed by model id
    #[serde(default)]
    pub models: HashMap<String, ModelOverride>,
    /// Header rules applied on top of computed headers
    #[serde(default)]
    pub headers: Vec<HeaderRuleConfig>,
    /// Body rules applied on top of the computed request body
    #[serde(default)]
    pub body: Vec<BodyRuleConfig>,
    /// Forward proxy for this provider
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl ProviderConfig {
    /// Create a provider with no keys, rules or overrides
    pub fn new(id: impl Into<String>, provider_type: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            provider_type: provider_type.into(),
            base_url: base_url.into(),
            api_keys: Vec::new(),
            key_strategy: KeyStrategy::default(),
            chat_path: None,
            use_responses_api: false,
            models: HashMap::new(),
            headers: Vec::new(),
            body: Vec::new(),
            proxy: None,
        }
    }

    /// Add an API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_keys.push(SecretString::from(key.into()));
        self
    }

    /// Add a per-model override
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, model_override: ModelOverride) -> Self {
        self.models.insert(model.into(), model_override);
        self
    }

    /// Override entry for `model`, if configured
    pub fn model_override(&self, model: &str) -> Option<&ModelOverride> {
        self.models.get(model)
    }

    /// Name suitable for log fields
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Strategy for choosing among several API keys
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Always the first key
    #[default]
    First,
    /// Cycle through keys in order
    RoundRobin,
    /// Key with the fewest requests so far
    LeastUsed,
}

/// Capability flags and built-in tools for one model
///
/// `None` leaves the decision to model-id heuristics.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverride {
    /// Accepts image input
    #[serde(default)]
    pub vision: Option<bool>,
    /// Supports a reasoning/thinking budget
    #[serde(default)]
    pub reasoning: Option<bool>,
    /// Supports native function calling
    #[serde(default)]
    pub function_calling: Option<bool>,
    /// Prefer prompt-emulated tool use even when native calling works
    #[serde(default)]
    pub prompt_tools: bool,
    /// Vendor web search tool
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    /// Gemini URL context tool
    #[serde(default)]
    pub url_context: bool,
}

/// Vendor web search settings
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebSearchConfig {
    /// Inject the search tool
    #[serde(default)]
    pub enabled: bool,
    /// Maximum searches per request
    #[serde(default)]
    pub max_uses: Option<u32>,
    /// Only search these domains
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    /// Never search these domains
    #[serde(default)]
    pub blocked_domains: Vec<String>,
    /// Approximate user location for localized results
    #[serde(default)]
    pub user_location: Option<UserLocation>,
}

/// Approximate location forwarded to search tools
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserLocation {
    /// City name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Region or state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Two-letter country code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// IANA time zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl ModelOverride {
    /// Whether the vendor web search tool should be injected
    pub fn web_search_enabled(&self) -> bool {
        self.web_search.as_ref().is_some_and(|search| search.enabled)
    }
}
