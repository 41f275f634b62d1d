//! Model capability detection and reasoning budget translation

use converse_config::ProviderConfig;

/// What a model can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    /// Accepts image input
    pub vision: bool,
    /// Accepts a reasoning budget or effort
    pub reasoning: bool,
    /// Supports native function calling
    pub function_calling: bool,
}

impl ModelCapabilities {
    /// Detect from the model id, letting per-model config override each flag
    pub fn detect(provider: &ProviderConfig, model: &str) -> Self {
        let model_override = provider.model_override(model);
        let id = model.to_ascii_lowercase();

        Self {
            vision: model_override
                .and_then(|o| o.vision)
                .unwrap_or_else(|| is_vision_model(&id)),
            reasoning: model_override
                .and_then(|o| o.reasoning)
                .unwrap_or_else(|| is_reasoning_model(&id)),
            function_calling: model_override
                .and_then(|o| o.function_calling)
                .unwrap_or_else(|| supports_function_calling(&id)),
        }
    }
}

fn is_reasoning_model(id: &str) -> bool {
    const MARKERS: &[&str] = &[
        "claude-3-7",
        "claude-sonnet-4",
        "claude-opus-4",
        "claude-haiku-4",
        "claude-4",
        "gemini-2.5",
        "gemini-3",
        "gpt-5",
        "gpt-oss",
        "deepseek-r1",
        "deepseek-reasoner",
        "qwq",
        "qwen3",
        "grok-3-mini",
        "grok-4",
        "magistral",
        "thinking",
    ];

    let base = id.rsplit('/').next().unwrap_or(id);
    let openai_o_series = base.len() > 1
        && base.starts_with('o')
        && base[1..].starts_with(|c: char| c.is_ascii_digit())
        && !base.starts_with("o1-mini")
        && !base.starts_with("o1-preview");

    openai_o_series || MARKERS.iter().any(|marker| id.contains(marker))
}

fn is_vision_model(id: &str) -> bool {
    const MARKERS: &[&str] = &[
        "gpt-4o",
        "gpt-4.1",
        "gpt-4-turbo",
        "gpt-5",
        "o3",
        "o4",
        "claude-3",
        "claude-sonnet",
        "claude-opus",
        "claude-haiku",
        "gemini",
        "gemma-3",
        "grok-4",
        "vision",
        "-vl",
        "pixtral",
        "llava",
        "mistral-medium",
        "mistral-small",
    ];
    MARKERS.iter().any(|marker| id.contains(marker))
}

fn supports_function_calling(id: &str) -> bool {
    const UNSUPPORTED: &[&str] = &["o1-mini", "o1-preview", "deepseek-r1", "embed", "tts", "whisper", "dall-e"];
    !UNSUPPORTED.iter().any(|marker| id.contains(marker))
}

/// Reasoning request derived from a numeric budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningSetting {
    /// Leave the decision to the vendor and omit the parameter
    Auto,
    /// Turn reasoning off
    Disabled,
    /// Spend up to this many tokens
    Budget(u32),
}

/// Upper bound of the "low" effort bucket
const LOW_EFFORT_MAX: u32 = 2048;

/// Upper bound of the "medium" effort bucket
const MEDIUM_EFFORT_MAX: u32 = 8192;

impl ReasoningSetting {
    /// `0` disables, negative or missing means auto
    pub fn from_budget(budget: Option<i64>) -> Self {
        match budget {
            None => Self::Auto,
            Some(0) => Self::Disabled,
            Some(n) if n < 0 => Self::Auto,
            Some(n) => Self::Budget(u32::try_from(n).unwrap_or(u32::MAX)),
        }
    }

    /// `OpenAI` effort level, `None` when the parameter should be omitted
    pub const fn openai_effort(self) -> Option<&'static str> {
        match self {
            Self::Auto => None,
            Self::Disabled => Some("none"),
            Self::Budget(n) if n <= LOW_EFFORT_MAX => Some("low"),
            Self::Budget(n) if n <= MEDIUM_EFFORT_MAX => Some("medium"),
            Self::Budget(_) => Some("high"),
        }
    }
}
