use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::ToolCall;

/// Function-style tool the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Function name
    pub name: String,
    /// What the tool does
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the arguments object
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// A tool call surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    /// Call identifier
    pub id: String,
    /// Function name
    pub name: String,
    /// Parsed arguments
    pub arguments: Value,
}

impl ToolCallInfo {
    /// Attach the executor's result
    pub fn with_result(&self, result: String) -> ToolResultInfo {
        ToolResultInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
            result,
        }
    }
}

impl From<&ToolCall> for ToolCallInfo {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: parse_arguments(&call.arguments),
        }
    }
}

/// A resolved tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultInfo {
    /// Call identifier
    pub id: String,
    /// Function name
    pub name: String,
    /// Arguments the tool ran with
    pub arguments: Value,
    /// Tool output fed back to the model
    pub result: String,
}

/// Parse a JSON argument string, falling back to an empty object
pub fn parse_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            if !raw.trim().is_empty() {
                tracing::debug!(arguments = %raw, "tool arguments are not a JSON object, using {{}}");
            }
            Value::Object(serde_json::Map::new())
        }
    }
}

/// Runs tools on behalf of the model
///
/// Tool-level failures should be encoded in the returned string so the model
/// can react to them. An `Err` fails the whole request.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `name` with `arguments`
    async fn execute(&self, name: &str, arguments: Value) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> ToolExecutor for F
where
    F: Fn(String, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn execute(&self, name: &str, arguments: Value) -> anyhow::Result<String> {
        self(name.to_owned(), arguments).await
    }
}
