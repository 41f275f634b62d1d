//! System prompt and XML rendering for prompt-emulated tool use

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::types::{ToolCallInfo, ToolDefinition, ToolResultInfo, parse_arguments};

/// Tag wrapping a tool invocation
pub const TOOL_USE_TAG: &str = "tool_use";

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<name>\s*(.*?)\s*</name>").expect("must be valid regex"));

static ARGUMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<arguments>\s*(.*?)\s*</arguments>").expect("must be valid regex"));

const INSTRUCTIONS: &str = "\
You can use tools to answer the user's request. To call a tool, write a block in exactly this format:

<tool_use>
<name>tool name</name>
<arguments>{\"argument\": \"value\"}</arguments>
</tool_use>

Rules:
- Use at most one tool block per reply and stop writing right after it.
- The arguments must be a single JSON object matching the tool's parameters.
- The result arrives in the next user message wrapped in <tool_use_result> tags.
- When no tool is needed, answer directly without any tool block.";

/// System prompt teaching the model the tool format, followed by the caller's own
pub fn build_system_prompt(original: Option<&str>, tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(INSTRUCTIONS);

    prompt.push_str("\n\nAvailable tools:\n");
    for tool in tools {
        render_tool(&mut prompt, tool);
    }

    if let Some(first) = tools.first() {
        let _ = write!(
            prompt,
            "\nExample:\n{}\n",
            render_tool_use(&first.name, &example_arguments(&first.parameters))
        );
    }

    if let Some(original) = original.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push('\n');
        prompt.push_str(original);
    }

    prompt
}

fn render_tool(prompt: &mut String, tool: &ToolDefinition) {
    let _ = writeln!(prompt, "\n## {}", tool.name);
    if !tool.description.is_empty() {
        let _ = writeln!(prompt, "{}", tool.description);
    }

    let properties = tool.parameters.get("properties").and_then(Value::as_object);
    let Some(properties) = properties.filter(|p| !p.is_empty()) else {
        prompt.push_str("Parameters: none\n");
        return;
    };

    let required: Vec<&str> = tool
        .parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    prompt.push_str("Parameters:\n");
    for (name, schema) in properties {
        let kind = schema.get("type").and_then(Value::as_str).unwrap_or("any");
        let requirement = if required.contains(&name.as_str()) { "required" } else { "optional" };
        let _ = write!(prompt, "- {name} ({kind}, {requirement})");
        if let Some(description) = schema.get("description").and_then(Value::as_str) {
            let _ = write!(prompt, ": {description}");
        }
        prompt.push('\n');
    }
}

/// Placeholder arguments shaped like the schema
fn example_arguments(schema: &Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Value::Object(Map::new());
    };

    properties
        .iter()
        .map(|(name, property)| {
            let example = match property.get("type").and_then(Value::as_str) {
                Some("integer" | "number") => Value::from(1),
                Some("boolean") => Value::Bool(true),
                Some("array") => Value::Array(Vec::new()),
                Some("object") => Value::Object(Map::new()),
                _ => Value::String("...".to_owned()),
            };
            (name.clone(), example)
        })
        .collect::<Map<String, Value>>()
        .into()
}

/// `<tool_use>` block for a call
pub fn render_tool_use(name: &str, arguments: &Value) -> String {
    format!("<tool_use>\n<name>{name}</name>\n<arguments>{arguments}</arguments>\n</tool_use>")
}

/// `<tool_use_result>` block fed back to the model
pub fn render_tool_result(result: &ToolResultInfo) -> String {
    format!(
        "<tool_use_result>\n<name>{}</name>\n<result>{}</result>\n</tool_use_result>",
        result.name, result.result
    )
}

/// Name and arguments from the interior of a `<tool_use>` block
///
/// Returns `None` without a name. Arguments that are not a JSON object
/// become `{}`.
pub fn parse_tool_use(inner: &str) -> Option<(String, Value)> {
    let name = NAME.captures(inner)?.get(1)?.as_str().trim();
    if name.is_empty() {
        return None;
    }

    let arguments = ARGUMENTS
        .captures(inner)
        .and_then(|captures| captures.get(1))
        .map_or_else(|| Value::Object(Map::new()), |raw| parse_arguments(raw.as_str()));

    Some((name.to_owned(), arguments))
}

/// Surface a parsed block as a tool call
pub fn tool_call(id: String, name: String, arguments: Value) -> ToolCallInfo {
    ToolCallInfo { id, name, arguments }
}
