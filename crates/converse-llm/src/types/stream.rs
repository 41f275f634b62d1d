use serde::{Deserialize, Serialize};

use super::tool::{ToolCallInfo, ToolResultInfo};

/// One unit of streamed chat output
///
/// A request yields any number of content, reasoning and tool chunks followed
/// by exactly one chunk with `is_done` set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStreamChunk {
    /// Incremental answer text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental reasoning text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Terminal chunk marker
    #[serde(default)]
    pub is_done: bool,
    /// Usage accumulated over all rounds, set on the terminal chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Tool calls requested in the round that just ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallInfo>>,
    /// Results for the preceding tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResultInfo>>,
}

impl ChatStreamChunk {
    /// Text delta
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// Reasoning delta
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    /// Tool calls requested by the model
    pub fn tool_calls(calls: Vec<ToolCallInfo>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::default()
        }
    }

    /// Resolved tool calls
    pub fn tool_results(results: Vec<ToolResultInfo>) -> Self {
        Self {
            tool_results: Some(results),
            ..Self::default()
        }
    }

    /// Terminal chunk
    pub fn done(usage: Option<TokenUsage>) -> Self {
        Self {
            is_done: true,
            usage,
            ..Self::default()
        }
    }
}

/// Token counts for a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input tokens
    pub prompt_tokens: u64,
    /// Output tokens
    pub completion_tokens: u64,
    /// Input tokens served from cache
    #[serde(default)]
    pub cached_tokens: u64,
    /// Output tokens spent on reasoning
    #[serde(default)]
    pub thought_tokens: u64,
    /// `prompt_tokens + completion_tokens`
    pub total_tokens: u64,
    /// Per-round usage for prompt-emulated tool loops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_usages: Option<Vec<TokenUsage>>,
}

impl TokenUsage {
    /// Usage with the total derived from its parts
    pub const fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            cached_tokens: 0,
            thought_tokens: 0,
            total_tokens: prompt_tokens + completion_tokens,
            round_usages: None,
        }
    }

    /// Combine usage from two rounds of the same request
    ///
    /// Each round re-sends the history, so prompt counts are not additive:
    /// the larger one is kept. Completion tokens accumulate.
    #[must_use]
    pub fn merge(&self, next: &Self) -> Self {
        let prompt_tokens = self.prompt_tokens.max(next.prompt_tokens);
        let completion_tokens = self.completion_tokens + next.completion_tokens;
        Self {
            prompt_tokens,
            completion_tokens,
            cached_tokens: self.cached_tokens.max(next.cached_tokens),
            thought_tokens: self.thought_tokens + next.thought_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            round_usages: None,
        }
    }

    /// Fold an optional round usage into an optional running total
    pub fn accumulate(total: Option<Self>, round: Option<&Self>) -> Option<Self> {
        match (total, round) {
            (Some(total), Some(round)) => Some(total.merge(round)),
            (None, Some(round)) => Some(round.clone()),
            (total, None) => total,
        }
    }
}
