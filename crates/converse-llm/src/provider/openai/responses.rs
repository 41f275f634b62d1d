//! Responses API protocol

use std::collections::BTreeMap;

use converse_config::ModelOverride;
use serde_json::json;

use super::{PartialCall, finish_calls};
use crate::error::LlmError;
use crate::protocol::responses::{
    InputContent, InputItem, OutputItem, ReasoningConfig, ResponsesEvent, ResponsesRequest, ResponsesUsage,
};
use crate::provider::capabilities::{ModelCapabilities, ReasoningSetting};
use crate::provider::finish_request;
use crate::provider::format::prepare_messages;
use crate::provider::overrides::default_headers;
use crate::provider::tool_loop::{Delta, PreparedRequest, RoundOutcome, RoundParser, Transcript, VendorProtocol};
use crate::transport::join_url;
use crate::types::{ChatParams, Content, ContentPart, Message, Reasoning, Role, TokenUsage, ToolDefinition};

const DEFAULT_RESPONSES_PATH: &str = "/responses";

/// `POST /responses` with `stream: true`
pub struct ResponsesProtocol;

impl VendorProtocol for ResponsesProtocol {
    type Parser = ResponsesParser;

    fn name(&self) -> &'static str {
        "openai-responses"
    }

    fn prepare(&self, params: &ChatParams, transcript: &Transcript) -> Result<PreparedRequest, LlmError> {
        let provider = &params.provider;
        let caps = ModelCapabilities::detect(provider, &params.model);
        let prepared = prepare_messages(transcript.messages(), &params.user_images, caps.vision);

        let mut tools: Vec<serde_json::Value> = if caps.function_calling {
            params.tools.iter().map(function_tool).collect()
        } else {
            Vec::new()
        };
        if provider
            .model_override(&params.model)
            .is_some_and(ModelOverride::web_search_enabled)
        {
            tools.push(json!({ "type": "web_search_preview" }));
        }

        let reasoning = if caps.reasoning {
            let setting = ReasoningSetting::from_budget(params.thinking_budget);
            setting.openai_effort().map(|effort| ReasoningConfig {
                effort,
                summary: (setting != ReasoningSetting::Disabled).then_some("auto"),
            })
        } else {
            None
        };

        let request = ResponsesRequest {
            model: params.model.clone(),
            input: prepared.messages.into_iter().flat_map(encode_message).collect(),
            instructions: prepared.system,
            stream: true,
            max_output_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            reasoning,
            tools,
        };

        let path = provider.chat_path.as_deref().unwrap_or(DEFAULT_RESPONSES_PATH);
        let url = join_url(&provider.base_url, path);
        finish_request(params, url, default_headers(params.api_key())?, &request)
    }

    fn parser(&self, _params: &ChatParams) -> ResponsesParser {
        ResponsesParser::default()
    }
}

fn function_tool(tool: &ToolDefinition) -> serde_json::Value {
    json!({
        "type": "function",
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

/// One transcript message becomes zero or more input items
fn encode_message(message: Message) -> Vec<InputItem> {
    match message.role {
        Role::Assistant => {
            let text = message.content.as_text();
            let mut items = Vec::with_capacity(1 + message.tool_calls().len());
            if !text.is_empty() {
                items.push(InputItem::Message {
                    role: "assistant",
                    content: vec![InputContent::OutputText { text }],
                });
            }
            items.extend(message.tool_calls().iter().map(|call| InputItem::FunctionCall {
                call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            }));
            items
        }
        Role::Tool => vec![InputItem::FunctionCallOutput {
            call_id: message.tool_call_id.unwrap_or_default(),
            output: message.content.as_text(),
        }],
        Role::System | Role::User => {
            let role = if message.role == Role::System { "developer" } else { "user" };
            vec![InputItem::Message {
                role,
                content: encode_content(message.content),
            }]
        }
    }
}

fn encode_content(content: Content) -> Vec<InputContent> {
    match content {
        Content::Text(text) => vec![InputContent::InputText { text }],
        Content::Parts(parts) => parts
            .into_iter()
            .map(|part| match part {
                ContentPart::Text { text } => InputContent::InputText { text },
                ContentPart::Image { url, detail } => InputContent::InputImage { image_url: url, detail },
            })
            .collect(),
    }
}

/// Accumulates one Responses API round
#[derive(Debug, Default)]
pub struct ResponsesParser {
    text: String,
    reasoning: String,
    calls: BTreeMap<usize, PartialCall>,
    usage: Option<TokenUsage>,
}

impl RoundParser for ResponsesParser {
    fn feed(&mut self, payload: &str) -> Result<Vec<Delta>, LlmError> {
        let event: ResponsesEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed responses event");
                return Ok(Vec::new());
            }
        };

        let delta = match event {
            ResponsesEvent::OutputTextDelta { delta } if !delta.is_empty() => {
                self.text.push_str(&delta);
                Some(Delta::Content(delta))
            }
            ResponsesEvent::ReasoningSummaryTextDelta { delta } | ResponsesEvent::ReasoningTextDelta { delta }
                if !delta.is_empty() =>
            {
                self.reasoning.push_str(&delta);
                Some(Delta::Reasoning(delta))
            }
            ResponsesEvent::OutputItemAdded { output_index, item } => {
                if let OutputItem::FunctionCall { call_id, name, arguments } = item {
                    self.calls.insert(
                        output_index,
                        PartialCall {
                            id: call_id,
                            name,
                            arguments,
                        },
                    );
                }
                None
            }
            ResponsesEvent::FunctionCallArgumentsDelta { output_index, delta } => {
                self.calls.entry(output_index).or_default().arguments.push_str(&delta);
                None
            }
            ResponsesEvent::OutputItemDone { output_index, item } => {
                if let OutputItem::FunctionCall { call_id, name, arguments } = item {
                    let call = self.calls.entry(output_index).or_default();
                    if !call_id.is_empty() {
                        call.id = call_id;
                    }
                    if !name.is_empty() {
                        call.name = name;
                    }
                    if !arguments.is_empty() {
                        call.arguments = arguments;
                    }
                }
                None
            }
            ResponsesEvent::Completed { response } => {
                self.usage = response.usage.as_ref().map(convert_usage);
                None
            }
            ResponsesEvent::Failed { response } => {
                let message = response
                    .error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "response failed".to_owned());
                return Err(LlmError::Stream(message));
            }
            ResponsesEvent::Error { message } => return Err(LlmError::Stream(message)),
            _ => None,
        };

        Ok(delta.into_iter().collect())
    }

    fn finish(self) -> RoundOutcome {
        RoundOutcome {
            text: self.text,
            reasoning: (!self.reasoning.is_empty()).then(|| Reasoning {
                text: self.reasoning,
                signature: None,
            }),
            tool_calls: finish_calls(self.calls),
            usage: self.usage,
        }
    }
}

fn convert_usage(usage: &ResponsesUsage) -> TokenUsage {
    let mut converted = TokenUsage::new(usage.input_tokens, usage.output_tokens);
    converted.cached_tokens = usage.input_tokens_details.as_ref().map_or(0, |d| d.cached_tokens);
    converted.thought_tokens = usage.output_tokens_details.as_ref().map_or(0, |d| d.reasoning_tokens);
    converted
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use converse_config::ProviderConfig;
    use serde_json::{Value, json};

    use super::*;
    use crate::provider::{ChatAdapter, OpenAiAdapter};
    use crate::testing::{ScriptedTransport, collect, content, reasoning};

    fn provider() -> Arc<ProviderConfig> {
        let mut provider = ProviderConfig::new("openai", "openai", "https://api.openai.com/v1").with_api_key("sk-test");
        provider.use_responses_api = true;
        Arc::new(provider)
    }

    fn body(params: &ChatParams) -> Value {
        ResponsesProtocol
            .prepare(params, &Transcript::new(params.messages.clone()))
            .unwrap()
            .body
    }

    #[test]
    fn request_uses_instructions_and_input_items() {
        let mut params = ChatParams::new(
            provider(),
            "o4-mini",
            vec![Message::system("Be brief."), Message::user("hi")],
        )
        .with_thinking_budget(1024);
        params.max_tokens = Some(300);

        let body = body(&params);

        assert_eq!(body["instructions"], "Be brief.");
        assert_eq!(
            body["input"],
            json!([{"type": "message", "role": "user", "content": [{"type": "input_text", "text": "hi"}]}])
        );
        assert_eq!(body["max_output_tokens"], 300);
        assert_eq!(body["reasoning"], json!({"effort": "low", "summary": "auto"}));
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn function_call_items_replay_tool_rounds() {
        let transcript = Transcript::new(vec![Message::user("weather?")]).with_round(
            Message::assistant("Checking.").with_tool_calls(vec![crate::types::ToolCall {
                id: "call_1".to_owned(),
                name: "weather".to_owned(),
                arguments: "{}".to_owned(),
            }]),
            [Message::tool("call_1", "weather", "sunny")],
        );
        let params = ChatParams::new(provider(), "gpt-4.1", Vec::new());

        let request = ResponsesProtocol.prepare(&params, &transcript).unwrap();

        assert_eq!(request.url, "https://api.openai.com/v1/responses");
        assert_eq!(
            request.body["input"],
            json!([
                {"type": "message", "role": "user", "content": [{"type": "input_text", "text": "weather?"}]},
                {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "Checking."}]},
                {"type": "function_call", "call_id": "call_1", "name": "weather", "arguments": "{}"},
                {"type": "function_call_output", "call_id": "call_1", "output": "sunny"},
            ])
        );
        assert!(request.body.get("reasoning").is_none());
    }

    #[test]
    fn parser_collects_text_reasoning_calls_and_usage() {
        let mut parser = ResponsesParser::default();
        let payloads = [
            r#"{"type":"response.created","response":{}}"#,
            r#"{"type":"response.reasoning_summary_text.delta","delta":"plan"}"#,
            r#"{"type":"response.output_text.delta","delta":"Hi"}"#,
            r#"{"type":"response.output_item.added","output_index":2,"item":{"type":"function_call","call_id":"fc_1","name":"weather","arguments":""}}"#,
            r#"{"type":"response.function_call_arguments.delta","output_index":2,"delta":"{\"city\":"}"#,
            r#"{"type":"response.function_call_arguments.delta","output_index":2,"delta":"\"Oslo\"}"}"#,
            r#"{"type":"response.output_item.done","output_index":1,"item":{"type":"message"}}"#,
            r#"{"type":"response.completed","response":{"usage":{"input_tokens":20,"output_tokens":9,"input_tokens_details":{"cached_tokens":4},"output_tokens_details":{"reasoning_tokens":6}}}}"#,
        ];

        let deltas: Vec<Delta> = payloads.iter().flat_map(|p| parser.feed(p).unwrap()).collect();
        let outcome = parser.finish();

        assert_eq!(deltas, [Delta::Reasoning("plan".to_owned()), Delta::Content("Hi".to_owned())]);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].id, "fc_1");
        assert_eq!(outcome.tool_calls[0].arguments, r#"{"city":"Oslo"}"#);
        let usage = outcome.usage.unwrap();
        assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.cached_tokens, usage.thought_tokens), (20, 9, 4, 6));
    }

    #[test]
    fn failed_response_is_a_stream_error() {
        let mut parser = ResponsesParser::default();
        let err = parser
            .feed(r#"{"type":"response.failed","response":{"error":{"message":"quota exceeded"}}}"#)
            .unwrap_err();
        assert!(matches!(err, LlmError::Stream(ref m) if m == "quota exceeded"));

        let err = parser.feed(r#"{"type":"error","message":"boom"}"#).unwrap_err();
        assert!(matches!(err, LlmError::Stream(ref m) if m == "boom"));
    }

    #[tokio::test]
    async fn adapter_routes_to_responses_api() {
        let transport = ScriptedTransport::new(vec![ScriptedTransport::sse(&[
            r#"{"type":"response.reasoning_text.delta","delta":"hmm"}"#,
            r#"{"type":"response.output_text.delta","delta":"Hello"}"#,
            r#"{"type":"response.completed","response":{"usage":{"input_tokens":5,"output_tokens":2}}}"#,
        ])]);
        let params = ChatParams::new(provider(), "gpt-5", vec![Message::user("hi")]);

        let chunks = collect(OpenAiAdapter::new(transport.clone()).send_stream(params))
            .await
            .unwrap();

        assert_eq!(transport.requests()[0].url, "https://api.openai.com/v1/responses");
        assert_eq!(reasoning(&chunks), "hmm");
        assert_eq!(content(&chunks), "Hello");
        assert_eq!(chunks.last().unwrap().usage.as_ref().unwrap().total_tokens, 7);
    }
}
