//! Tool calling emulated through the system prompt
//!
//! Wraps any [`ChatAdapter`] for models without native function calling.
//! The model is taught to write `<tool_use>` blocks, which are cut out of
//! the streamed text, executed, and answered with `<tool_use_result>` user
//! messages. The wrapped adapter never sees tool definitions.

mod extractor;
mod template;

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use uuid::Uuid;

pub use extractor::{Extracted, TagExtractor};
pub use template::{TOOL_USE_TAG, build_system_prompt, parse_tool_use, render_tool_result, render_tool_use};

use crate::error::LlmError;
use crate::provider::format::{attach_user_images, split_system};
use crate::provider::tool_loop::Transcript;
use crate::provider::{ChatAdapter, ChunkStream};
use crate::types::{ChatParams, ChatStreamChunk, Message, TokenUsage};

/// Prompt-based tool use over another adapter
pub struct PromptToolAdapter {
    inner: Arc<dyn ChatAdapter>,
}

impl PromptToolAdapter {
    /// Wrap `inner`
    pub fn new(inner: Arc<dyn ChatAdapter>) -> Self {
        Self { inner }
    }
}

impl ChatAdapter for PromptToolAdapter {
    fn name(&self) -> &'static str {
        "prompt-tools"
    }

    fn send_stream(&self, params: ChatParams) -> ChunkStream {
        Box::pin(run(Arc::clone(&self.inner), params))
    }
}

/// What one inner round produced
struct Round {
    text: String,
    tag: Option<String>,
    usage: Option<TokenUsage>,
}

fn run(inner: Arc<dyn ChatAdapter>, params: ChatParams) -> impl Stream<Item = Result<ChatStreamChunk, LlmError>> + Send {
    async_stream::try_stream! {
        let max_rounds = params.max_tool_loop_iterations.max(1);
        let (original_system, mut conversation) = split_system(&params.messages);
        attach_user_images(&mut conversation, &params.user_images);
        let system_prompt = build_system_prompt(original_system.as_deref(), &params.tools);

        let mut transcript = Transcript::new(conversation);
        let mut usage: Option<TokenUsage> = None;
        let mut round_usages = Vec::new();
        let mut round = 0;

        loop {
            if params.cancel.is_cancelled() {
                Err::<(), _>(LlmError::Aborted)?;
            }
            round += 1;
            tracing::debug!(provider = %params.provider.id, round, "prompt tool round");

            let mut stream = inner.send_stream(inner_params(&params, Some(&system_prompt), transcript.messages()));
            let mut extractor = TagExtractor::new(TOOL_USE_TAG);
            let mut current = Round { text: String::new(), tag: None, usage: None };

            loop {
                let next = tokio::select! {
                    biased;
                    () = params.cancel.cancelled() => None,
                    chunk = stream.next() => Some(chunk),
                };
                let Some(next) = next else {
                    Err::<(), _>(LlmError::Aborted)?;
                    return;
                };
                let Some(chunk) = next else { break };
                let chunk = chunk?;
                if let Some(reasoning) = chunk.reasoning {
                    yield ChatStreamChunk::reasoning(reasoning);
                }
                if let Some(content) = chunk.content {
                    for text in visible_text(&mut extractor, &mut current, &content) {
                        yield ChatStreamChunk::content(text);
                    }
                }
                if chunk.is_done {
                    current.usage = chunk.usage;
                }
            }

            if current.tag.is_none()
                && let Some(rest) = extractor.finish()
            {
                current.text.push_str(&rest);
                yield ChatStreamChunk::content(rest);
            }

            if let Some(round_usage) = &current.usage {
                round_usages.push(round_usage.clone());
            }
            usage = TokenUsage::accumulate(usage, current.usage.as_ref());

            let Some(tag) = current.tag else {
                yield ChatStreamChunk::done(with_round_usages(usage, round_usages));
                break;
            };

            let Some((name, arguments)) = parse_tool_use(&tag) else {
                tracing::debug!(provider = %params.provider.id, "tool block without a name, treating as text");
                yield ChatStreamChunk::content(format!("<{TOOL_USE_TAG}>{tag}</{TOOL_USE_TAG}>"));
                yield ChatStreamChunk::done(with_round_usages(usage, round_usages));
                break;
            };

            let call = template::tool_call(format!("call_{}", Uuid::new_v4().simple()), name, arguments);
            yield ChatStreamChunk::tool_calls(vec![call.clone()]);

            let Some(executor) = params.tool_executor.clone() else {
                yield ChatStreamChunk::done(with_round_usages(usage, round_usages));
                break;
            };

            let output = tokio::select! {
                biased;
                () = params.cancel.cancelled() => Err(LlmError::Aborted),
                output = executor.execute(&call.name, call.arguments.clone()) => output.map_err(|e| {
                    LlmError::ToolExecution { tool: call.name.clone(), message: format!("{e:#}") }
                }),
            };
            let result = call.with_result(output?);
            yield ChatStreamChunk::tool_results(vec![result.clone()]);

            let assistant = Message::assistant(format!("{}{}", current.text, render_tool_use(&call.name, &call.arguments)));
            transcript = transcript.with_round(assistant, [Message::user(render_tool_result(&result))]);

            if round >= max_rounds {
                tracing::debug!(provider = %params.provider.id, round, "prompt tool limit reached, requesting final answer");
                let mut stream = inner.send_stream(inner_params(&params, original_system.as_deref(), transcript.messages()));
                let mut final_usage = None;
                loop {
                    let next = tokio::select! {
                        biased;
                        () = params.cancel.cancelled() => None,
                        chunk = stream.next() => Some(chunk),
                    };
                    let Some(next) = next else {
                        Err::<(), _>(LlmError::Aborted)?;
                        return;
                    };
                    let Some(chunk) = next else { break };
                    let chunk = chunk?;
                    if let Some(reasoning) = chunk.reasoning {
                        yield ChatStreamChunk::reasoning(reasoning);
                    }
                    if let Some(content) = chunk.content {
                        yield ChatStreamChunk::content(content);
                    }
                    if chunk.is_done {
                        final_usage = chunk.usage;
                    }
                }

                if let Some(final_usage) = &final_usage {
                    round_usages.push(final_usage.clone());
                }
                usage = TokenUsage::accumulate(usage, final_usage.as_ref());
                yield ChatStreamChunk::done(with_round_usages(usage, round_usages));
                break;
            }
        }
    }
}

/// Run content through the extractor, keeping only text before the first block
fn visible_text(extractor: &mut TagExtractor, round: &mut Round, content: &str) -> Vec<String> {
    if round.tag.is_some() {
        return Vec::new();
    }

    let mut visible = Vec::new();
    for piece in extractor.push(content) {
        if round.tag.is_some() {
            break;
        }
        match piece {
            Extracted::Text(text) => {
                round.text.push_str(&text);
                visible.push(text);
            }
            Extracted::Tag(tag) => round.tag = Some(tag),
        }
    }
    visible
}

/// Parameters for one plain request to the wrapped adapter
fn inner_params(params: &ChatParams, system: Option<&str>, messages: &[Message]) -> ChatParams {
    let mut inner = params.clone();
    inner.messages = system
        .map(Message::system)
        .into_iter()
        .chain(messages.iter().cloned())
        .collect();
    inner.user_images = Vec::new();
    inner.image_paths = Vec::new();
    inner.tools = Vec::new();
    inner.tool_executor = None;
    inner.prompt_tool_use = false;
    inner.max_tool_loop_iterations = 1;
    inner
}

fn with_round_usages(usage: Option<TokenUsage>, round_usages: Vec<TokenUsage>) -> Option<TokenUsage> {
    usage.map(|mut usage| {
        usage.round_usages = (!round_usages.is_empty()).then_some(round_usages);
        usage
    })
}
