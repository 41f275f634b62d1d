use std::path::Path;

use anyhow::Context;
use http::HeaderName;
use secrecy::ExposeSecret;

use crate::{Config, HeaderRuleConfig, ProviderConfig};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, parses the
    /// result, fills provider ids from their table keys and validates.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion or parsing
    /// fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw).context("config variable expansion failed")?;

        let mut config: Self = toml::from_str(&expanded).context("failed to parse config")?;

        for (id, provider) in &mut config.providers {
            id.clone_into(&mut provider.id);
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending provider or setting
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        for provider in self.providers.values() {
            validate_provider(provider)?;
        }

        if let Some(ref id) = self.defaults.provider
            && !self.providers.contains_key(id)
        {
            anyhow::bail!("defaults.provider '{id}' is not a configured provider");
        }

        if self.defaults.max_tool_loop_iterations == 0 {
            anyhow::bail!("defaults.max_tool_loop_iterations must be greater than 0");
        }

        Ok(())
    }
}

fn validate_provider(provider: &ProviderConfig) -> anyhow::Result<()> {
    let id = &provider.id;

    url::Url::parse(&provider.base_url).with_context(|| format!("invalid base_url for provider '{id}'"))?;

    if provider.api_keys.iter().any(|key| key.expose_secret().trim().is_empty()) {
        anyhow::bail!("provider '{id}' has an empty API key");
    }

    for rule in &provider.headers {
        let name = match rule {
            HeaderRuleConfig::Insert(insert) => &insert.name,
            HeaderRuleConfig::Remove(remove) => &remove.name,
        };
        HeaderName::try_from(name.as_str())
            .with_context(|| format!("invalid header name '{name}' for provider '{id}'"))?;
    }

    for rule in &provider.body {
        if rule.key().split('.').any(str::is_empty) {
            anyhow::bail!("invalid body rule key '{}' for provider '{id}'", rule.key());
        }
    }

    Ok(())
}
