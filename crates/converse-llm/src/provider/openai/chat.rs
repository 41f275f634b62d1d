//! Chat Completions protocol

use std::collections::BTreeMap;

use converse_config::ModelOverride;
use serde_json::json;

use super::{PartialCall, finish_calls, is_grok, is_mistral};
use crate::error::LlmError;
use crate::protocol::openai::{
    ChatChunk, ChatContent, ChatContentPart, ChatFunctionCall, ChatMessage, ChatRequest, ChatToolCall, ChatUsage,
    ImageUrl, SearchParameters, StreamOptions, WebSearchOptions,
};
use crate::provider::capabilities::{ModelCapabilities, ReasoningSetting};
use crate::provider::finish_request;
use crate::provider::format::prepare_messages;
use crate::provider::overrides::default_headers;
use crate::provider::tool_loop::{Delta, PreparedRequest, RoundOutcome, RoundParser, Transcript, VendorProtocol};
use crate::transport::join_url;
use crate::types::{ChatParams, Content, ContentPart, Message, Reasoning, Role, TokenUsage, ToolDefinition};

const DEFAULT_CHAT_PATH: &str = "/chat/completions";

/// `POST /chat/completions` with `stream: true`
pub struct ChatCompletionsProtocol;

impl VendorProtocol for ChatCompletionsProtocol {
    type Parser = ChatParser;

    fn name(&self) -> &'static str {
        "openai-chat"
    }

    fn prepare(&self, params: &ChatParams, transcript: &Transcript) -> Result<PreparedRequest, LlmError> {
        let provider = &params.provider;
        let caps = ModelCapabilities::detect(provider, &params.model);
        let prepared = prepare_messages(transcript.messages(), &params.user_images, caps.vision);

        let mut messages = Vec::with_capacity(prepared.messages.len() + 1);
        if let Some(system) = prepared.system {
            messages.push(ChatMessage {
                role: "system",
                content: Some(ChatContent::Text(system)),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages.extend(prepared.messages.into_iter().map(encode_message));

        let tools = if caps.function_calling {
            params.tools.iter().map(function_tool).collect()
        } else {
            Vec::new()
        };

        let web_search = provider
            .model_override(&params.model)
            .is_some_and(ModelOverride::web_search_enabled);
        let grok = is_grok(provider, &params.model);
        let reasoning_effort = if caps.reasoning {
            ReasoningSetting::from_budget(params.thinking_budget).openai_effort()
        } else {
            None
        };

        let request = ChatRequest {
            model: params.model.clone(),
            messages,
            stream: true,
            stream_options: (!is_mistral(provider)).then_some(StreamOptions { include_usage: true }),
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            reasoning_effort,
            tools,
            search_parameters: (web_search && grok).then_some(SearchParameters { mode: "auto" }),
            web_search_options: (web_search && !grok).then(WebSearchOptions::default),
        };

        let path = provider.chat_path.as_deref().unwrap_or(DEFAULT_CHAT_PATH);
        let url = join_url(&provider.base_url, path);
        finish_request(params, url, default_headers(params.api_key())?, &request)
    }

    fn parser(&self, _params: &ChatParams) -> ChatParser {
        ChatParser::default()
    }
}

fn function_tool(tool: &ToolDefinition) -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn encode_message(message: Message) -> ChatMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    match message.role {
        Role::Assistant => {
            let text = message.content.as_text();
            let tool_calls: Vec<ChatToolCall> = message
                .tool_calls()
                .iter()
                .map(|call| ChatToolCall {
                    id: call.id.clone(),
                    call_type: "function",
                    function: ChatFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();

            ChatMessage {
                role,
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(ChatContent::Text(text)),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            }
        }
        Role::Tool => ChatMessage {
            role,
            content: Some(ChatContent::Text(message.content.as_text())),
            tool_calls: None,
            tool_call_id: message.tool_call_id,
        },
        Role::System | Role::User => ChatMessage {
            role,
            content: Some(encode_content(message.content)),
            tool_calls: None,
            tool_call_id: None,
        },
    }
}

fn encode_content(content: Content) -> ChatContent {
    match content {
        Content::Text(text) => ChatContent::Text(text),
        Content::Parts(parts) => ChatContent::Parts(
            parts
                .into_iter()
                .map(|part| match part {
                    ContentPart::Text { text } => ChatContentPart::Text { text },
                    ContentPart::Image { url, detail } => ChatContentPart::ImageUrl {
                        image_url: ImageUrl { url, detail },
                    },
                })
                .collect(),
        ),
    }
}

/// Accumulates one Chat Completions round
#[derive(Debug, Default)]
pub struct ChatParser {
    text: String,
    reasoning: String,
    calls: BTreeMap<usize, PartialCall>,
    usage: Option<TokenUsage>,
}

impl RoundParser for ChatParser {
    fn feed(&mut self, payload: &str) -> Result<Vec<Delta>, LlmError> {
        let chunk: ChatChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed chat chunk");
                return Ok(Vec::new());
            }
        };

        if let Some(error) = chunk.error {
            return Err(LlmError::Stream(error.message));
        }

        if let Some(usage) = &chunk.usage {
            self.usage = Some(convert_usage(usage));
        }

        let mut deltas = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning).filter(|r| !r.is_empty()) {
                self.reasoning.push_str(&reasoning);
                deltas.push(Delta::Reasoning(reasoning));
            }

            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                self.text.push_str(&content);
                deltas.push(Delta::Content(content));
            }

            for fragment in delta.tool_calls.unwrap_or_default() {
                let call = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                    call.id = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        call.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        call.arguments.push_str(&arguments);
                    }
                }
            }
        }

        Ok(deltas)
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

fn convert_usage(usage: &ChatUsage) -> TokenUsage {
    let mut converted = TokenUsage::new(usage.prompt_tokens, usage.completion_tokens);
    converted.cached_tokens = usage.prompt_tokens_details.as_ref().map_or(0, |d| d.cached_tokens);
    converted.thought_tokens = usage.completion_tokens_details.as_ref().map_or(0, |d| d.reasoning_tokens);
    converted
}
