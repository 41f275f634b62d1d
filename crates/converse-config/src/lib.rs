//! Configuration for Converse
//!
//! Providers, per-model overrides, request rewrite rules and logging are read
//! from a single TOML file. `{{ env.VAR }}` placeholders are expanded before
//! parsing so secrets never have to live in the file itself.

#![allow(clippy::must_use_candidate)]

mod env;
pub mod logging;
mod loader;
pub mod provider;
pub mod proxy;
pub mod rules;

use indexmap::IndexMap;
use serde::Deserialize;

pub use logging::*;
pub use provider::*;
pub use proxy::*;
pub use rules::*;

/// Top-level Converse configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Chat providers keyed by identifier
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Defaults applied when a request leaves a setting unspecified
    #[serde(default)]
    pub defaults: ChatDefaults,
    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Look up a provider by identifier
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.get(id)
    }
}

/// Request defaults
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatDefaults {
    /// Provider used when none is named
    #[serde(default)]
    pub provider: Option<String>,
    /// Model used when none is named
    #[serde(default)]
    pub model: Option<String>,
    /// System prompt prepended to every conversation
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Upper bound on tool-calling rounds per request
    #[serde(default = "default_max_tool_loop_iterations")]
    pub max_tool_loop_iterations: usize,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            system_prompt: None,
            max_tool_loop_iterations: default_max_tool_loop_iterations(),
        }
    }
}

const fn default_max_tool_loop_iterations() -> usize {
    10
}
