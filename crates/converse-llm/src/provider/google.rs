//! Google Gemini adapter
//!
//! Streams `models/{model}:streamGenerateContent?alt=sse`. Thought parts
//! become reasoning, function calls get locally generated ids, and tool
//! schemas are reduced to the `OpenAPI` subset Gemini accepts.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::capabilities::{ModelCapabilities, ReasoningSetting};
use super::format::{parse_data_url, prepare_messages};
use super::overrides::{default_headers, secret_header};
use super::tool_loop::{self, Delta, PreparedRequest, RoundOutcome, RoundParser, Transcript, VendorProtocol};
use super::{ChatAdapter, ChunkStream, finish_request};
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleContent, GoogleFileData, GoogleFunctionCall, GoogleFunctionResponse, GoogleGenerationConfig,
    GoogleInlineData, GooglePart, GoogleRequest, GoogleResponse, GoogleThinkingConfig, GoogleUsageMetadata,
};
use crate::transport::{Transport, join_url};
use crate::types::{ChatParams, Content, ContentPart, Message, Reasoning, Role, TokenUsage, ToolCall, parse_arguments};

/// Schema keywords Gemini rejects
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "additionalProperties",
    "default",
    "examples",
    "$ref",
    "$defs",
    "definitions",
    "const",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "patternProperties",
];

const DEFAULT_STREAM_PATH: &str = "/models/{model}:streamGenerateContent?alt=sse";

/// Gemini adapter
pub struct GeminiAdapter {
    transport: Arc<dyn Transport>,
}

impl GeminiAdapter {
    /// Create an adapter sending through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl ChatAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn send_stream(&self, params: ChatParams) -> ChunkStream {
        Box::pin(tool_loop::run(Arc::new(GenerateContentProtocol), Arc::clone(&self.transport), params))
    }
}

/// `streamGenerateContent` over SSE
pub struct GenerateContentProtocol;

impl VendorProtocol for GenerateContentProtocol {
    type Parser = GeminiParser;

    fn name(&self) -> &'static str {
        "gemini-generate-content"
    }

    fn prepare(&self, params: &ChatParams, transcript: &Transcript) -> Result<PreparedRequest, LlmError> {
        let provider = &params.provider;
        let caps = ModelCapabilities::detect(provider, &params.model);
        let prepared = prepare_messages(transcript.messages(), &params.user_images, caps.vision);

        let thinking_config = caps.reasoning.then(|| thinking_config(params.thinking_budget));
        let generation_config = GoogleGenerationConfig {
            temperature: params.temperature,
            top_p: params.top_p,
            max_output_tokens: params.max_tokens,
            thinking_config,
        };
        let has_generation_config = generation_config.temperature.is_some()
            || generation_config.top_p.is_some()
            || generation_config.max_output_tokens.is_some()
            || generation_config.thinking_config.is_some();

        let request = GoogleRequest {
            contents: encode_contents(prepared.messages),
            system_instruction: prepared.system.map(|system| GoogleContent {
                role: None,
                parts: vec![text_part(system)],
            }),
            generation_config: has_generation_config.then_some(generation_config),
            tools: tools(params, caps.function_calling),
        };

        let path = provider
            .chat_path
            .as_deref()
            .unwrap_or(DEFAULT_STREAM_PATH)
            .replace("{model}", &params.model);
        let url = join_url(&provider.base_url, &path);

        finish_request(params, url, headers(params)?, &request)
    }

    fn parser(&self, _params: &ChatParams) -> GeminiParser {
        GeminiParser::default()
    }
}

fn headers(params: &ChatParams) -> Result<HeaderMap, LlmError> {
    let mut headers = default_headers(params.api_key())?;
    if let Some(key) = params.api_key() {
        headers.insert("x-goog-api-key", secret_header(key.expose_secret())?);
    }
    Ok(headers)
}

fn thinking_config(budget: Option<i64>) -> GoogleThinkingConfig {
    match ReasoningSetting::from_budget(budget) {
        ReasoningSetting::Budget(budget) => GoogleThinkingConfig {
            thinking_budget: Some(budget),
            include_thoughts: Some(true),
        },
        ReasoningSetting::Disabled => GoogleThinkingConfig {
            thinking_budget: Some(0),
            include_thoughts: None,
        },
        ReasoningSetting::Auto => GoogleThinkingConfig {
            thinking_budget: None,
            include_thoughts: Some(true),
        },
    }
}

/// Built-in tools, or function declarations when none are enabled
fn tools(params: &ChatParams, function_calling: bool) -> Vec<Value> {
    let model_override = params.provider.model_override(&params.model);

    let mut builtins = Vec::new();
    if model_override.is_some_and(|o| o.web_search_enabled()) {
        builtins.push(json!({ "google_search": {} }));
    }
    if model_override.is_some_and(|o| o.url_context) {
        builtins.push(json!({ "url_context": {} }));
    }

    if !builtins.is_empty() {
        if !params.tools.is_empty() {
            tracing::debug!(
                provider = %params.provider.id,
                tools = params.tools.len(),
                "built-in tools enabled, omitting function declarations"
            );
        }
        return builtins;
    }

    if !function_calling || params.tools.is_empty() {
        return Vec::new();
    }

    let declarations: Vec<Value> = params
        .tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": sanitize_schema(&tool.parameters),
            })
        })
        .collect();
    vec![json!({ "functionDeclarations": declarations })]
}

/// Reduce a JSON Schema to what Gemini accepts
///
/// Drops unsupported keywords and turns `["T", "null"]` type unions into
/// `type: T` plus `nullable: true`. Property names are never mistaken for
/// keywords.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                match key.as_str() {
                    k if UNSUPPORTED_SCHEMA_KEYS.contains(&k) => {}
                    "type" => {
                        if let Value::Array(types) = value {
                            let concrete: Vec<&Value> = types.iter().filter(|t| t.as_str() != Some("null")).collect();
                            if concrete.len() < types.len() {
                                out.insert("nullable".to_owned(), Value::Bool(true));
                            }
                            if let Some(first) = concrete.first() {
                                out.insert("type".to_owned(), (*first).clone());
                            }
                        } else {
                            out.insert(key.clone(), value.clone());
                        }
                    }
                    "properties" => {
                        let properties = match value {
                            Value::Object(properties) => Value::Object(
                                properties
                                    .iter()
                                    .map(|(name, schema)| (name.clone(), sanitize_schema(schema)))
                                    .collect(),
                            ),
                            other => other.clone(),
                        };
                        out.insert(key.clone(), properties);
                    }
                    _ => {
                        out.insert(key.clone(), sanitize_schema(value));
                    }
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

fn text_part(text: String) -> GooglePart {
    GooglePart {
        text: Some(text),
        ..GooglePart::default()
    }
}

/// Encode messages, folding consecutive tool results into one user turn
fn encode_contents(messages: Vec<Message>) -> Vec<GoogleContent> {
    let mut contents: Vec<GoogleContent> = Vec::with_capacity(messages.len());
    let mut in_tool_results = false;

    for message in messages {
        if message.role == Role::Tool {
            let part = GooglePart {
                function_response: Some(GoogleFunctionResponse {
                    name: message.name.clone().unwrap_or_default(),
                    response: json!({ "content": message.content.as_text() }),
                }),
                ..GooglePart::default()
            };
            match contents.last_mut() {
                Some(last) if in_tool_results => last.parts.push(part),
                _ => contents.push(GoogleContent {
                    role: Some("user".to_owned()),
                    parts: vec![part],
                }),
            }
            in_tool_results = true;
            continue;
        }

        in_tool_results = false;
        let (role, parts) = if message.role == Role::Assistant {
            ("model", model_parts(message))
        } else {
            ("user", user_parts(message.content))
        };
        contents.push(GoogleContent {
            role: Some(role.to_owned()),
            parts,
        });
    }

    contents
}

fn model_parts(message: Message) -> Vec<GooglePart> {
    let mut parts = Vec::new();
    let mut signature = message.reasoning.as_ref().and_then(|r| r.signature.clone());

    let text = message.content.as_text();
    if !text.is_empty() || message.tool_calls().is_empty() {
        parts.push(text_part(text));
    }

    for call in message.tool_calls() {
        parts.push(GooglePart {
            function_call: Some(GoogleFunctionCall {
                name: call.name.clone(),
                args: parse_arguments(&call.arguments),
            }),
            // The signature belongs to the first call of the turn
            thought_signature: signature.take(),
            ..GooglePart::default()
        });
    }

    parts
}

fn user_parts(content: Content) -> Vec<GooglePart> {
    content
        .into_parts()
        .into_iter()
        .map(|part| match part {
            ContentPart::Text { text } => text_part(text),
            ContentPart::Image { url, .. } => match parse_data_url(&url) {
                Some((mime_type, data)) => GooglePart {
                    inline_data: Some(GoogleInlineData {
                        mime_type: mime_type.to_owned(),
                        data: data.to_owned(),
                    }),
                    ..GooglePart::default()
                },
                None => GooglePart {
                    file_data: Some(GoogleFileData {
                        mime_type: mime_from_url(&url).to_owned(),
                        file_uri: url,
                    }),
                    ..GooglePart::default()
                },
            },
        })
        .collect()
}

fn mime_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Accumulates one Gemini round
#[derive(Debug, Default)]
pub struct GeminiParser {
    text: String,
    thoughts: String,
    signature: Option<String>,
    calls: Vec<ToolCall>,
    usage: Option<TokenUsage>,
}

impl RoundParser for GeminiParser {
    fn feed(&mut self, payload: &str) -> Result<Vec<Delta>, LlmError> {
        let response: GoogleResponse = match serde_json::from_str(payload) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed gemini chunk");
                return Ok(Vec::new());
            }
        };

        if let Some(error) = response.error {
            return Err(LlmError::Stream(format!("{} ({}): {}", error.status, error.code, error.message)));
        }

        if let Some(usage) = &response.usage_metadata {
            self.usage = Some(convert_usage(usage));
        }

        let mut deltas = Vec::new();
        let parts = response
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts);

        for part in parts {
            if let Some(signature) = part.thought_signature {
                self.signature = Some(signature);
            }

            if let Some(call) = part.function_call {
                self.calls.push(ToolCall {
                    id: format!("call_{}", Uuid::new_v4().simple()),
                    name: call.name,
                    arguments: call.args.to_string(),
                });
                continue;
            }

            let Some(text) = part.text.filter(|t| !t.is_empty()) else { continue };
            if part.thought == Some(true) {
                self.thoughts.push_str(&text);
                deltas.push(Delta::Reasoning(text));
            } else {
                self.text.push_str(&text);
                deltas.push(Delta::Content(text));
            }
        }

        Ok(deltas)
    }

    fn finish(self) -> RoundOutcome {
        let reasoning = (!self.thoughts.is_empty() || self.signature.is_some()).then(|| Reasoning {
            text: self.thoughts,
            signature: self.signature,
        });

        RoundOutcome {
            text: self.text,
            reasoning,
            tool_calls: self.calls,
            usage: self.usage,
        }
    }
}

/// Completion tokens include thinking
fn convert_usage(usage: &GoogleUsageMetadata) -> TokenUsage {
    let mut converted = TokenUsage::new(
        usage.prompt_token_count,
        usage.candidates_token_count + usage.thoughts_token_count,
    );
    converted.thought_tokens = usage.thoughts_token_count;
    converted.cached_tokens = usage.cached_content_token_count;
    converted
}

#[cfg(test)]
mod tests {
    use converse_config::{ModelOverride, ProviderConfig, WebSearchConfig};

    use super::*;
    use crate::testing::{ScriptedTransport, collect, content, reasoning};
    use crate::types::{ToolDefinition, ToolExecutor};

    const FLASH: &str = "gemini-2.5-flash";

    fn provider() -> ProviderConfig {
        ProviderConfig::new("google", "gemini", "https://generativelanguage.googleapis.com/v1beta").with_api_key("g-key")
    }

    fn params(model: &str) -> ChatParams {
        ChatParams::new(Arc::new(provider()), model, vec![Message::system("Be brief."), Message::user("hi")])
    }

    fn prepare(params: &ChatParams) -> PreparedRequest {
        GenerateContentProtocol
            .prepare(params, &Transcript::new(params.messages.clone()))
            .unwrap()
    }

    fn noop_executor() -> Arc<dyn ToolExecutor> {
        Arc::new(|_: String, _: Value| async { Ok::<_, anyhow::Error>(String::new()) })
    }

    #[test]
    fn request_shape_url_and_key() {
        let request = prepare(&params(FLASH));

        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(request.headers["x-goog-api-key"], "g-key");
        assert_eq!(request.body["systemInstruction"], json!({"parts": [{"text": "Be brief."}]}));
        assert_eq!(request.body["contents"], json!([{"role": "user", "parts": [{"text": "hi"}]}]));
        assert_eq!(
            request.body["generationConfig"],
            json!({"thinkingConfig": {"includeThoughts": true}})
        );
    }

    #[test]
    fn chat_path_supports_model_placeholder() {
        let mut provider = provider();
        provider.chat_path = Some("/publishers/google/models/{model}:streamGenerateContent?alt=sse".to_owned());
        let params = ChatParams::new(Arc::new(provider), FLASH, vec![Message::user("hi")]);

        assert_eq!(
            prepare(&params).url,
            "https://generativelanguage.googleapis.com/v1beta/publishers/google/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn thinking_budget_translation() {
        assert_eq!(
            prepare(&params(FLASH).with_thinking_budget(0)).body["generationConfig"]["thinkingConfig"],
            json!({"thinkingBudget": 0})
        );
        assert_eq!(
            prepare(&params(FLASH).with_thinking_budget(2048)).body["generationConfig"]["thinkingConfig"],
            json!({"thinkingBudget": 2048, "includeThoughts": true})
        );
        assert!(
            prepare(&params("gemini-2.0-flash").with_thinking_budget(2048))
                .body
                .get("generationConfig")
                .is_none()
        );
    }

    #[test]
    fn built_in_tools_suppress_function_declarations() {
        let provider = provider().with_model(
            FLASH,
            ModelOverride {
                web_search: Some(WebSearchConfig {
                    enabled: true,
                    ..WebSearchConfig::default()
                }),
                url_context: true,
                ..ModelOverride::default()
            },
        );
        let tool = ToolDefinition::new("weather", "Current weather", json!({"type": "object"}));
        let params = ChatParams::new(Arc::new(provider), FLASH, vec![Message::user("hi")])
            .with_tools(vec![tool.clone()], noop_executor());

        assert_eq!(prepare(&params).body["tools"], json!([{"google_search": {}}, {"url_context": {}}]));

        let plain = ChatParams::new(Arc::new(self::provider()), FLASH, vec![Message::user("hi")])
            .with_tools(vec![tool], noop_executor());
        assert_eq!(
            prepare(&plain).body["tools"][0]["functionDeclarations"][0]["name"],
            "weather"
        );
    }

    #[test]
    fn schemas_are_sanitized() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "default": {"type": "string", "default": "x", "examples": ["a"]},
                "limit": {"type": ["integer", "null"], "exclusiveMinimum": 0},
                "tags": {"type": "array", "items": {"type": "string", "const": "t"}},
            },
            "required": ["default"],
        });

        assert_eq!(
            sanitize_schema(&schema),
            json!({
                "type": "object",
                "properties": {
                    "default": {"type": "string"},
                    "limit": {"type": "integer", "nullable": true},
                    "tags": {"type": "array", "items": {"type": "string"}},
                },
                "required": ["default"],
            })
        );
    }

    #[test]
    fn tool_round_encoding() {
        let transcript = Transcript::new(vec![Message::user("weather?")]).with_round(
            Message::assistant("")
                .with_tool_calls(vec![
                    ToolCall {
                        id: "call_a".to_owned(),
                        name: "weather".to_owned(),
                        arguments: r#"{"city":"Oslo"}"#.to_owned(),
                    },
                    ToolCall {
                        id: "call_b".to_owned(),
                        name: "time".to_owned(),
                        arguments: "{}".to_owned(),
                    },
                ])
                .with_reasoning(Some(Reasoning {
                    text: String::new(),
                    signature: Some("sig".to_owned()),
                })),
            [
                Message::tool("call_a", "weather", "sunny"),
                Message::tool("call_b", "time", "noon"),
            ],
        );

        let body = GenerateContentProtocol
            .prepare(&params(FLASH), &transcript)
            .unwrap()
            .body;

        assert_eq!(
            body["contents"][1],
            json!({"role": "model", "parts": [
                {"functionCall": {"name": "weather", "args": {"city": "Oslo"}}, "thoughtSignature": "sig"},
                {"functionCall": {"name": "time", "args": {}}},
            ]})
        );
        assert_eq!(
            body["contents"][2],
            json!({"role": "user", "parts": [
                {"functionResponse": {"name": "weather", "response": {"content": "sunny"}}},
                {"functionResponse": {"name": "time", "response": {"content": "noon"}}},
            ]})
        );
    }

    #[test]
    fn inline_images_become_inline_data() {
        let mut message = Message::user("");
        message.content = Content::Parts(vec![
            ContentPart::text("what is this"),
            ContentPart::image("data:image/webp;base64,UklG"),
        ]);
        let params = ChatParams::new(Arc::new(provider()), FLASH, vec![message]);

        assert_eq!(
            prepare(&params).body["contents"][0]["parts"][1],
            json!({"inlineData": {"mimeType": "image/webp", "data": "UklG"}})
        );
    }

    #[test]
    fn parser_separates_thoughts_and_calls() {
        let mut parser = GeminiParser::default();
        let payloads = [
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"pondering","thought":true}]}}]}"#,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Answer"}]}}],"usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":3,"thoughtsTokenCount":7}}"#,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"weather","args":{"city":"Oslo"}},"thoughtSignature":"sig"}]}}],"usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":9,"thoughtsTokenCount":7,"cachedContentTokenCount":4}}"#,
        ];

        let deltas: Vec<Delta> = payloads.iter().flat_map(|p| parser.feed(p).unwrap()).collect();
        let outcome = parser.finish();

        assert_eq!(
            deltas,
            [
                Delta::Reasoning("pondering".to_owned()),
                Delta::Content("Answer".to_owned())
            ]
        );
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.tool_calls[0].id.starts_with("call_"));
        assert_eq!(outcome.tool_calls[0].arguments, r#"{"city":"Oslo"}"#);
        assert_eq!(outcome.reasoning.unwrap().signature.as_deref(), Some("sig"));

        let usage = outcome.usage.unwrap();
        assert_eq!(
            (usage.prompt_tokens, usage.completion_tokens, usage.thought_tokens, usage.cached_tokens),
            (12, 16, 7, 4)
        );
    }

    #[test]
    fn error_payload_fails_the_round() {
        let mut parser = GeminiParser::default();
        let err = parser
            .feed(r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::Stream(ref m) if m.contains("Resource exhausted")));
    }

    #[tokio::test]
    async fn adapter_streams_reasoning_then_content() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::sse(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"hmm","thought":true}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":1}}"#,
        ])]);

        let chunks = collect(GeminiAdapter::new(transport.clone()).send_stream(params(FLASH)))
            .await
            .unwrap();

        assert_eq!(reasoning(&chunks), "hmm");
        assert_eq!(content(&chunks), "Hello");
        assert_eq!(chunks.last().unwrap().usage.as_ref().unwrap().total_tokens, 5);
        assert_eq!(transport.request_count(), 1);
    }
}
