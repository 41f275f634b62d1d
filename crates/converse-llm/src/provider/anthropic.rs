//! Anthropic Messages API adapter

use std::collections::BTreeMap;
use std::sync::Arc;

use converse_config::WebSearchConfig;
use reqwest::header::HeaderValue;
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use super::capabilities::{ModelCapabilities, ReasoningSetting};
use super::format::{parse_data_url, prepare_messages};
use super::overrides::{default_headers, secret_header};
use super::tool_loop::{self, Delta, PreparedRequest, RoundOutcome, RoundParser, Transcript, VendorProtocol};
use super::{ChatAdapter, ChunkStream, finish_request};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest, AnthropicStreamContentBlock,
    AnthropicStreamDelta, AnthropicStreamEvent, AnthropicUsage, ThinkingConfig,
};
use crate::transport::{Transport, join_url};
use crate::types::{
    ChatParams, Content, ContentPart, Message, Reasoning, Role, TokenUsage, ToolCall, ToolDefinition, parse_arguments,
};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta flag allowing thinking between tool calls
const INTERLEAVED_THINKING_BETA: &str = "interleaved-thinking-2025-05-14";

/// Default max tokens when not specified (Anthropic requires this field)
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Smallest thinking budget Anthropic accepts
const MIN_THINKING_BUDGET: u32 = 1024;

const DEFAULT_MESSAGES_PATH: &str = "/messages";

/// Claude adapter
pub struct ClaudeAdapter {
    transport: Arc<dyn Transport>,
}

impl ClaudeAdapter {
    /// Create an adapter sending through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl ChatAdapter for ClaudeAdapter {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn send_stream(&self, params: ChatParams) -> ChunkStream {
        Box::pin(tool_loop::run(Arc::new(MessagesProtocol), Arc::clone(&self.transport), params))
    }
}

/// `POST /messages` with `stream: true`
pub struct MessagesProtocol;

/// Thinking and the sampling settings it constrains
struct ThinkingPlan {
    thinking: Option<ThinkingConfig>,
    max_tokens: u32,
    temperature: Option<f64>,
    top_p: Option<f64>,
}

impl ThinkingPlan {
    fn new(params: &ChatParams, reasoning_model: bool) -> Self {
        let requested = params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        match ReasoningSetting::from_budget(params.thinking_budget) {
            ReasoningSetting::Budget(budget) if reasoning_model => {
                let budget = budget.max(MIN_THINKING_BUDGET);
                // max_tokens must exceed the thinking budget
                let max_tokens = if requested > budget {
                    requested
                } else {
                    budget.saturating_add(DEFAULT_MAX_TOKENS)
                };
                Self {
                    thinking: Some(ThinkingConfig::Enabled { budget_tokens: budget }),
                    max_tokens,
                    temperature: None,
                    top_p: None,
                }
            }
            ReasoningSetting::Disabled if reasoning_model => Self {
                thinking: Some(ThinkingConfig::Disabled),
                max_tokens: requested,
                temperature: params.temperature,
                top_p: params.top_p,
            },
            _ => Self {
                thinking: None,
                max_tokens: requested,
                temperature: params.temperature,
                top_p: params.top_p,
            },
        }
    }

    const fn enabled(&self) -> bool {
        matches!(self.thinking, Some(ThinkingConfig::Enabled { .. }))
    }
}

impl VendorProtocol for MessagesProtocol {
    type Parser = ClaudeParser;

    fn name(&self) -> &'static str {
        "anthropic-messages"
    }

    fn prepare(&self, params: &ChatParams, transcript: &Transcript) -> Result<PreparedRequest, LlmError> {
        let provider = &params.provider;
        let caps = ModelCapabilities::detect(provider, &params.model);
        let prepared = prepare_messages(transcript.messages(), &params.user_images, caps.vision);
        let plan = ThinkingPlan::new(params, caps.reasoning);

        let mut tools: Vec<Value> = if caps.function_calling {
            params.tools.iter().map(function_tool).collect()
        } else {
            Vec::new()
        };
        if let Some(search) = provider
            .model_override(&params.model)
            .and_then(|o| o.web_search.as_ref())
            .filter(|search| search.enabled)
        {
            tools.push(web_search_tool(search));
        }

        let mut headers = default_headers(params.api_key())?;
        if let Some(key) = params.api_key() {
            headers.insert("x-api-key", secret_header(key.expose_secret())?);
        }
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        if plan.enabled() && !tools.is_empty() {
            headers.insert("anthropic-beta", HeaderValue::from_static(INTERLEAVED_THINKING_BETA));
        }

        let request = AnthropicRequest {
            model: params.model.clone(),
            max_tokens: plan.max_tokens,
            system: prepared.system,
            messages: encode_messages(prepared.messages),
            stream: true,
            temperature: plan.temperature,
            top_p: plan.top_p,
            thinking: plan.thinking,
            tools,
        };

        let path = provider.chat_path.as_deref().unwrap_or(DEFAULT_MESSAGES_PATH);
        let url = join_url(&provider.base_url, path);
        finish_request(params, url, headers, &request)
    }

    fn parser(&self, _params: &ChatParams) -> ClaudeParser {
        ClaudeParser::default()
    }
}

fn function_tool(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

fn web_search_tool(config: &WebSearchConfig) -> Value {
    let mut tool = json!({ "type": "web_search_20250305", "name": "web_search" });
    if let Some(max_uses) = config.max_uses {
        tool["max_uses"] = json!(max_uses);
    }
    if !config.allowed_domains.is_empty() {
        tool["allowed_domains"] = json!(config.allowed_domains);
    }
    if !config.blocked_domains.is_empty() {
        tool["blocked_domains"] = json!(config.blocked_domains);
    }
    if let Some(location) = &config.user_location
        && let Ok(mut location) = serde_json::to_value(location)
    {
        location["type"] = json!("approximate");
        tool["user_location"] = location;
    }
    tool
}

/// Encode messages, folding consecutive tool results into one user turn
fn encode_messages(messages: Vec<Message>) -> Vec<AnthropicMessage> {
    let mut encoded: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
    let mut in_tool_results = false;

    for message in messages {
        match message.role {
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.as_text(),
                };
                match encoded.last_mut() {
                    Some(last) if in_tool_results => last.content.push(block),
                    _ => encoded.push(AnthropicMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
                in_tool_results = true;
                continue;
            }
            Role::Assistant => encoded.push(AnthropicMessage {
                role: "assistant",
                content: assistant_blocks(message),
            }),
            Role::User | Role::System => encoded.push(AnthropicMessage {
                role: "user",
                content: user_blocks(message.content),
            }),
        }
        in_tool_results = false;
    }

    encoded
}

fn assistant_blocks(message: Message) -> Vec<AnthropicContentBlock> {
    let mut blocks = Vec::new();

    if let Some(Reasoning {
        text,
        signature: Some(signature),
    }) = &message.reasoning
    {
        blocks.push(AnthropicContentBlock::Thinking {
            thinking: text.clone(),
            signature: signature.clone(),
        });
    }

    let text = message.content.as_text();
    if !text.is_empty() || message.tool_calls().is_empty() {
        blocks.push(AnthropicContentBlock::Text { text });
    }

    blocks.extend(message.tool_calls().iter().map(|call| AnthropicContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: parse_arguments(&call.arguments),
    }));

    blocks
}

fn user_blocks(content: Content) -> Vec<AnthropicContentBlock> {
    match content {
        Content::Text(text) => vec![AnthropicContentBlock::Text { text }],
        Content::Parts(parts) => parts
            .into_iter()
            .map(|part| match part {
                ContentPart::Text { text } => AnthropicContentBlock::Text { text },
                ContentPart::Image { url, .. } => AnthropicContentBlock::Image {
                    source: match parse_data_url(&url) {
                        Some((media_type, data)) => AnthropicImageSource::Base64 {
                            media_type: media_type.to_owned(),
                            data: data.to_owned(),
                        },
                        None => AnthropicImageSource::Url { url },
                    },
                },
            })
            .collect(),
    }
}

#[derive(Debug, Default)]
struct ToolBlock {
    id: String,
    name: String,
    input: String,
}

/// Accumulates one Messages API round
#[derive(Debug, Default)]
pub struct ClaudeParser {
    text: String,
    thinking: String,
    signature: Option<String>,
    tools: BTreeMap<usize, ToolBlock>,
    usage: Option<AnthropicUsage>,
}

impl RoundParser for ClaudeParser {
    fn feed(&mut self, payload: &str) -> Result<Vec<Delta>, LlmError> {
        let event: AnthropicStreamEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed anthropic event");
                return Ok(Vec::new());
            }
        };

        let delta = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.usage = Some(message.usage.unwrap_or_default());
                None
            }
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: AnthropicStreamContentBlock::ToolUse { id, name },
            } => {
                self.tools.insert(
                    index,
                    ToolBlock {
                        id,
                        name,
                        input: String::new(),
                    },
                );
                None
            }
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } if !text.is_empty() => {
                    self.text.push_str(&text);
                    Some(Delta::Content(text))
                }
                AnthropicStreamDelta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                    self.thinking.push_str(&thinking);
                    Some(Delta::Reasoning(thinking))
                }
                AnthropicStreamDelta::SignatureDelta { signature } => {
                    self.signature = Some(signature);
                    None
                }
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    if let Some(tool) = self.tools.get_mut(&index) {
                        tool.input.push_str(&partial_json);
                    }
                    None
                }
                _ => None,
            },
            AnthropicStreamEvent::MessageDelta { usage: Some(delta) } => {
                let usage = self.usage.get_or_insert_with(AnthropicUsage::default);
                usage.output_tokens = delta.output_tokens;
                if delta.input_tokens > 0 {
                    usage.input_tokens = delta.input_tokens;
                    usage.cache_read_input_tokens = delta.cache_read_input_tokens;
                    usage.cache_creation_input_tokens = delta.cache_creation_input_tokens;
                }
                None
            }
            AnthropicStreamEvent::Error { error } => {
                return Err(LlmError::Stream(format!("{}: {}", error.error_type, error.message)));
            }
            _ => None,
        };

        Ok(delta.into_iter().collect())
    }

    fn finish(self) -> RoundOutcome {
        let reasoning = (!self.thinking.is_empty() || self.signature.is_some()).then(|| Reasoning {
            text: self.thinking,
            signature: self.signature,
        });

        let tool_calls = self
            .tools
            .into_values()
            .map(|tool| ToolCall {
                id: tool.id,
                name: tool.name,
                arguments: if tool.input.trim().is_empty() {
                    "{}".to_owned()
                } else {
                    tool.input
                },
            })
            .collect();

        RoundOutcome {
            text: self.text,
            reasoning,
            tool_calls,
            usage: self.usage.as_ref().map(convert_usage),
        }
    }
}

/// Prompt tokens include cache reads and writes
fn convert_usage(usage: &AnthropicUsage) -> TokenUsage {
    let prompt = usage.input_tokens + usage.cache_read_input_tokens + usage.cache_creation_input_tokens;
    let mut converted = TokenUsage::new(prompt, usage.output_tokens);
    converted.cached_tokens = usage.cache_read_input_tokens;
    converted
}

#[cfg(test)]
mod tests {
    use converse_config::{ModelOverride, ProviderConfig, UserLocation};

    use super::*;
    use crate::testing::{ScriptedTransport, collect, content, reasoning};
    use crate::types::ToolExecutor;

    const SONNET: &str = "claude-sonnet-4-20250514";

    fn provider() -> Arc<ProviderConfig> {
        Arc::new(ProviderConfig::new("anthropic", "anthropic", "https://api.anthropic.com/v1").with_api_key("sk-ant"))
    }

    fn params(model: &str) -> ChatParams {
        ChatParams::new(provider(), model, vec![Message::system("Be brief."), Message::user("hi")])
    }

    fn prepare(params: &ChatParams) -> PreparedRequest {
        MessagesProtocol
            .prepare(params, &Transcript::new(params.messages.clone()))
            .unwrap()
    }

    fn weather_tool() -> ToolDefinition {
        ToolDefinition::new("weather", "Current weather", json!({"type": "object"}))
    }

    #[test]
    fn zero_budget_disables_thinking_without_budget_tokens() {
        let body = prepare(&params(SONNET).with_thinking_budget(0)).body;

        assert_eq!(body["thinking"], json!({"type": "disabled"}));
        assert!(body["thinking"].get("budget_tokens").is_none());
    }

    #[test]
    fn positive_budget_enables_thinking_and_drops_sampling() {
        let mut params = params(SONNET).with_thinking_budget(500);
        params.temperature = Some(0.2);
        params.top_p = Some(0.9);

        let body = prepare(&params).body;

        assert_eq!(body["thinking"], json!({"type": "enabled", "budget_tokens": 1024}));
        assert!(body["max_tokens"].as_u64().unwrap() > 1024);
        assert!(body.get("temperature").is_none());
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn max_tokens_kept_when_above_budget() {
        let mut params = params(SONNET).with_thinking_budget(2000);
        params.max_tokens = Some(16_000);

        let body = prepare(&params).body;

        assert_eq!(body["thinking"]["budget_tokens"], 2000);
        assert_eq!(body["max_tokens"], 16_000);
    }

    #[test]
    fn thinking_omitted_when_auto_or_model_cannot_reason() {
        assert!(prepare(&params(SONNET)).body.get("thinking").is_none());
        assert!(prepare(&params(SONNET).with_thinking_budget(-1)).body.get("thinking").is_none());
        assert!(
            prepare(&params("claude-3-5-haiku-latest").with_thinking_budget(0))
                .body
                .get("thinking")
                .is_none()
        );
    }

    #[test]
    fn request_shape_and_headers() {
        let request = prepare(&params("claude-3-5-haiku-latest"));

        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(request.body["system"], "Be brief.");
        assert_eq!(request.body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(
            request.body["messages"],
            json!([{"role": "user", "content": [{"type": "text", "text": "hi"}]}])
        );
        assert_eq!(request.headers["x-api-key"], "sk-ant");
        assert_eq!(request.headers["anthropic-version"], ANTHROPIC_VERSION);
        assert!(request.headers.get("anthropic-beta").is_none());
    }

    #[test]
    fn interleaved_thinking_beta_with_tools() {
        let executor: Arc<dyn ToolExecutor> =
            Arc::new(|_: String, _: Value| async { Ok::<_, anyhow::Error>(String::new()) });
        let params = params(SONNET)
            .with_thinking_budget(4096)
            .with_tools(vec![weather_tool()], executor);

        let request = prepare(&params);

        assert_eq!(request.headers["anthropic-beta"], INTERLEAVED_THINKING_BETA);
        assert_eq!(request.body["tools"][0]["input_schema"], json!({"type": "object"}));
    }

    #[test]
    fn consecutive_tool_results_share_one_user_message() {
        let calls = vec![
            ToolCall {
                id: "tu_1".to_owned(),
                name: "weather".to_owned(),
                arguments: r#"{"city":"Oslo"}"#.to_owned(),
            },
            ToolCall {
                id: "tu_2".to_owned(),
                name: "weather".to_owned(),
                arguments: "not json".to_owned(),
            },
        ];
        let transcript = Transcript::new(vec![Message::user("weather?")]).with_round(
            Message::assistant("")
                .with_tool_calls(calls)
                .with_reasoning(Some(Reasoning {
                    text: "two cities".to_owned(),
                    signature: Some("sig".to_owned()),
                })),
            [
                Message::tool("tu_1", "weather", "sunny"),
                Message::tool("tu_2", "weather", "rainy"),
            ],
        );

        let body = MessagesProtocol.prepare(&params(SONNET), &transcript).unwrap().body;

        assert_eq!(
            body["messages"][1],
            json!({"role": "assistant", "content": [
                {"type": "thinking", "thinking": "two cities", "signature": "sig"},
                {"type": "tool_use", "id": "tu_1", "name": "weather", "input": {"city": "Oslo"}},
                {"type": "tool_use", "id": "tu_2", "name": "weather", "input": {}},
            ]})
        );
        assert_eq!(
            body["messages"][2],
            json!({"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "tu_1", "content": "sunny"},
                {"type": "tool_result", "tool_use_id": "tu_2", "content": "rainy"},
            ]})
        );
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn images_become_base64_or_url_sources() {
        let mut message = Message::user("");
        message.content = Content::Parts(vec![
            ContentPart::text("compare"),
            ContentPart::image("data:image/jpeg;base64,AAAA"),
            ContentPart::image("https://example.com/b.png"),
        ]);
        let params = ChatParams::new(provider(), SONNET, vec![message]);

        let body = prepare(&params).body;

        assert_eq!(
            body["messages"][0]["content"],
            json!([
                {"type": "text", "text": "compare"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/jpeg", "data": "AAAA"}},
                {"type": "image", "source": {"type": "url", "url": "https://example.com/b.png"}},
            ])
        );
    }

    #[test]
    fn web_search_tool_carries_limits_and_location() {
        let provider = ProviderConfig::new("anthropic", "anthropic", "https://api.anthropic.com/v1").with_model(
            SONNET,
            ModelOverride {
                web_search: Some(WebSearchConfig {
                    enabled: true,
                    max_uses: Some(3),
                    allowed_domains: vec!["docs.rs".to_owned()],
                    blocked_domains: Vec::new(),
                    user_location: Some(UserLocation {
                        city: Some("Oslo".to_owned()),
                        country: Some("NO".to_owned()),
                        ..UserLocation::default()
                    }),
                }),
                ..ModelOverride::default()
            },
        );
        let params = ChatParams::new(Arc::new(provider), SONNET, vec![Message::user("news")]);

        let body = prepare(&params).body;

        assert_eq!(
            body["tools"],
            json!([{
                "type": "web_search_20250305",
                "name": "web_search",
                "max_uses": 3,
                "allowed_domains": ["docs.rs"],
                "user_location": {"type": "approximate", "city": "Oslo", "country": "NO"},
            }])
        );
    }

    #[test]
    fn parser_handles_thinking_text_tools_and_usage() {
        let mut parser = ClaudeParser::default();
        let payloads = [
            r#"{"type":"message_start","message":{"id":"m","usage":{"input_tokens":10,"cache_read_input_tokens":90,"cache_creation_input_tokens":5,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"Let me think"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"abc"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Checking."}}"#,
            r#"{"type":"content_block_start","index":2,"content_block":{"type":"tool_use","id":"tu_1","name":"weather","input":{}}}"#,
            r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"{\"city\""}}"#,
            r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":":\"Oslo\"}"}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":42}}"#,
            r#"{"type":"message_stop"}"#,
        ];

        let deltas: Vec<Delta> = payloads.iter().flat_map(|p| parser.feed(p).unwrap()).collect();
        let outcome = parser.finish();

        assert_eq!(
            deltas,
            [
                Delta::Reasoning("Let me think".to_owned()),
                Delta::Content("Checking.".to_owned())
            ]
        );
        assert_eq!(
            outcome.reasoning,
            Some(Reasoning {
                text: "Let me think".to_owned(),
                signature: Some("abc".to_owned()),
            })
        );
        assert_eq!(outcome.tool_calls[0].arguments, r#"{"city":"Oslo"}"#);
        let usage = outcome.usage.unwrap();
        assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.cached_tokens), (105, 42, 90));
    }

    #[test]
    fn error_event_fails_the_round() {
        let mut parser = ClaudeParser::default();
        let err = parser
            .feed(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::Stream(ref m) if m == "overloaded_error: Overloaded"));
    }

    #[tokio::test]
    async fn tool_round_replays_signed_thinking() {
        let transport = ScriptedTransport::new(vec![
            ScriptedTransport::sse(&[
                r#"{"type":"message_start","message":{"usage":{"input_tokens":20,"output_tokens":1}}}"#,
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"need data"}}"#,
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"s1"}}"#,
                r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"tu_1","name":"weather"}}"#,
                r#"{"type":"message_delta","usage":{"output_tokens":8}}"#,
            ]),
            ScriptedTransport::sse(&[
                r#"{"type":"message_start","message":{"usage":{"input_tokens":35,"output_tokens":1}}}"#,
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Sunny."}}"#,
                r#"{"type":"message_delta","usage":{"output_tokens":4}}"#,
            ]),
        ]);
        let executor: Arc<dyn ToolExecutor> =
            Arc::new(|_: String, _: Value| async { Ok::<_, anyhow::Error>("sunny".to_owned()) });
        let params = params(SONNET)
            .with_thinking_budget(2048)
            .with_tools(vec![weather_tool()], executor);

        let chunks = collect(ClaudeAdapter::new(transport.clone()).send_stream(params))
            .await
            .unwrap();

        assert_eq!(reasoning(&chunks), "need data");
        assert_eq!(content(&chunks), "Sunny.");
        let usage = chunks.last().unwrap().usage.clone().unwrap();
        assert_eq!((usage.prompt_tokens, usage.completion_tokens), (35, 12));

        let second = &transport.requests()[1].body["messages"];
        assert_eq!(second[1]["content"][0], json!({"type": "thinking", "thinking": "need data", "signature": "s1"}));
        assert_eq!(second[1]["content"][1]["input"], json!({}));
        assert_eq!(second[2]["content"][0]["tool_use_id"], "tu_1");
    }
}
