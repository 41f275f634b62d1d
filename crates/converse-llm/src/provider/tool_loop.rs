//! Native tool-calling loop shared by every vendor adapter
//!
//! A vendor supplies a [`VendorProtocol`]: how to build one round's request
//! from the transcript, and a [`RoundParser`] that turns that round's SSE
//! payloads into deltas and a final [`RoundOutcome`]. The loop owns
//! everything else: sending, error bodies, cancellation, running tools and
//! folding each round back into the [`Transcript`].

use std::pin::pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::LlmError;
use crate::transport::{StreamRequest, Transport, parse_sse_line};
use crate::types::{ChatParams, ChatStreamChunk, Message, Reasoning, TokenUsage, ToolCall, ToolCallInfo, ToolResultInfo};

/// One round's HTTP request
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Target URL
    pub url: String,
    /// Headers after all overrides
    pub headers: HeaderMap,
    /// JSON body after all overrides
    pub body: Value,
}

/// Incremental output parsed from one SSE payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Answer text
    Content(String),
    /// Reasoning text
    Reasoning(String),
}

impl From<Delta> for ChatStreamChunk {
    fn from(delta: Delta) -> Self {
        match delta {
            Delta::Content(text) => Self::content(text),
            Delta::Reasoning(text) => Self::reasoning(text),
        }
    }
}

/// Everything a round produced once its stream ended
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundOutcome {
    /// Full answer text
    pub text: String,
    /// Reasoning with its signature, if the vendor sent any
    pub reasoning: Option<Reasoning>,
    /// Tool calls in the order they were requested
    pub tool_calls: Vec<ToolCall>,
    /// Usage reported for this round
    pub usage: Option<TokenUsage>,
}

impl RoundOutcome {
    /// Assistant message reconstructing this round
    pub fn into_assistant_message(self) -> Message {
        Message::assistant(self.text)
            .with_tool_calls(self.tool_calls)
            .with_reasoning(self.reasoning)
    }
}

/// Parses the SSE payloads of one round
pub trait RoundParser: Send {
    /// Handle one `data:` payload
    ///
    /// Payloads that cannot be interpreted are skipped. An error is returned
    /// only when the vendor reports one in-stream.
    fn feed(&mut self, payload: &str) -> Result<Vec<Delta>, LlmError>;

    /// Finish the round
    fn finish(self) -> RoundOutcome;
}

/// Vendor-specific request building and response parsing
pub trait VendorProtocol: Send + Sync + 'static {
    /// Parser type for one round
    type Parser: RoundParser;

    /// Protocol name for logs
    fn name(&self) -> &'static str;

    /// Build the request for the next round
    fn prepare(&self, params: &ChatParams, transcript: &Transcript) -> Result<PreparedRequest, LlmError>;

    /// Fresh parser for one round
    fn parser(&self, params: &ChatParams) -> Self::Parser;
}

/// Conversation as seen by the model, advanced one round at a time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Start from the caller's messages
    pub const fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Messages so far
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Transcript after a round: the assistant turn, then its tool results
    #[must_use]
    pub fn with_round(mut self, assistant: Message, results: impl IntoIterator<Item = Message>) -> Self {
        self.messages.push(assistant);
        self.messages.extend(results);
        self
    }

    /// Transcript after a native tool round
    #[must_use]
    pub fn with_tool_round(self, outcome: RoundOutcome, results: &[ToolResultInfo]) -> Self {
        let results = results
            .iter()
            .map(|result| Message::tool(&result.id, &result.name, &result.result));
        self.with_round(outcome.into_assistant_message(), results)
    }

    /// Underlying messages
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Run a vendor protocol through the bounded tool loop
pub fn run<P: VendorProtocol>(
    protocol: Arc<P>,
    transport: Arc<dyn Transport>,
    params: ChatParams,
) -> impl Stream<Item = Result<ChatStreamChunk, LlmError>> + Send {
    async_stream::try_stream! {
        let max_rounds = params.max_tool_loop_iterations.max(1);
        let mut transcript = Transcript::new(params.messages.clone());
        let mut usage: Option<TokenUsage> = None;
        let mut round = 0;

        loop {
            if params.cancel.is_cancelled() {
                Err::<(), _>(LlmError::Aborted)?;
            }
            round += 1;

            let prepared = protocol.prepare(&params, &transcript)?;
            tracing::debug!(
                provider = %params.provider.id,
                protocol = protocol.name(),
                model = %params.model,
                round,
                url = %prepared.url,
                "sending chat request"
            );
            tracing::trace!(body = %prepared.body, "chat request body");

            let mut round_stream = pin!(stream_round(&*protocol, &*transport, &params, prepared));
            let mut finished = None;
            while let Some(step) = round_stream.next().await {
                match step? {
                    RoundStep::Delta(delta) => {
                        yield ChatStreamChunk::from(delta);
                    }
                    RoundStep::Finished(done) => finished = Some(done),
                }
            }
            let outcome = finished.unwrap_or_default();

            usage = TokenUsage::accumulate(usage, outcome.usage.as_ref());

            if outcome.tool_calls.is_empty() {
                yield ChatStreamChunk::done(usage.clone());
                break;
            }

            let calls: Vec<ToolCallInfo> = outcome.tool_calls.iter().map(ToolCallInfo::from).collect();
            yield ChatStreamChunk::tool_calls(calls.clone());

            let Some(executor) = params.tool_executor.clone() else {
                tracing::debug!(provider = %params.provider.id, "tool calls requested without an executor");
                yield ChatStreamChunk::done(usage.clone());
                break;
            };

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let output = tokio::select! {
                    biased;
                    () = params.cancel.cancelled() => Err(LlmError::Aborted),
                    output = executor.execute(&call.name, call.arguments.clone()) => output.map_err(|e| {
                        LlmError::ToolExecution { tool: call.name.clone(), message: format!("{e:#}") }
                    }),
                };
                results.push(call.with_result(output?));
            }
            yield ChatStreamChunk::tool_results(results.clone());

            if round >= max_rounds {
                tracing::debug!(provider = %params.provider.id, round, "tool loop reached its round limit");
                yield ChatStreamChunk::done(usage.clone());
                break;
            }

            transcript = transcript.with_tool_round(outcome, &results);
        }
    }
}

/// Progress within a single round
enum RoundStep {
    Delta(Delta),
    Finished(RoundOutcome),
}

/// Send one request and parse its stream
fn stream_round<'a, P: VendorProtocol>(
    protocol: &'a P,
    transport: &'a dyn Transport,
    params: &'a ChatParams,
    prepared: PreparedRequest,
) -> impl Stream<Item = Result<RoundStep, LlmError>> + Send + 'a {
    async_stream::try_stream! {
        let request = StreamRequest {
            url: prepared.url,
            headers: prepared.headers,
            body: prepared.body,
            proxy: params.provider.proxy.clone(),
            cancel: params.cancel.clone(),
        };

        let response = tokio::select! {
            biased;
            () = params.cancel.cancelled() => Err(LlmError::Aborted),
            response = transport.post_json_stream(request) => response,
        }?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            tracing::warn!(
                provider = %params.provider.id,
                status = %status,
                "upstream returned error"
            );
            Err::<(), _>(LlmError::Http { status: status.as_u16(), body })?;
            return;
        }

        let mut parser = protocol.parser(params);
        let mut lines = pin!(response.lines(params.cancel.clone()));
        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(payload) = parse_sse_line(&line) else { continue };
            for delta in parser.feed(payload)? {
                yield RoundStep::Delta(delta);
            }
        }

        yield RoundStep::Finished(parser.finish());
    }
}
