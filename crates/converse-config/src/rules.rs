use serde::Deserialize;

/// Header rewrite rule applied to every request sent to a provider
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderRuleConfig {
    /// Insert or replace a static header
    Insert(HeaderInsertConfig),
    /// Remove a header
    Remove(HeaderRemoveConfig),
}

/// Insert a static header
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderInsertConfig {
    /// Header name
    pub name: String,
    /// Header value
    pub value: String,
}

/// Remove a header by name
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRemoveConfig {
    /// Header name
    pub name: String,
}

/// JSON body rewrite rule applied to every request sent to a provider
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyRuleConfig {
    /// Set a field, creating intermediate objects as needed
    Set(BodySetConfig),
    /// Remove a field
    Remove(BodyRemoveConfig),
}

/// Set a body field
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodySetConfig {
    /// Dotted path, e.g. `generationConfig.seed`
    pub key: String,
    /// Value to write
    pub value: serde_json::Value,
}

/// Remove a body field
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodyRemoveConfig {
    /// Dotted path
    pub key: String,
}

impl BodyRuleConfig {
    /// Dotted path targeted by this rule
    pub fn key(&self) -> &str {
        match self {
            Self::Set(set) => &set.key,
            Self::Remove(remove) => &remove.key,
        }
    }
}
