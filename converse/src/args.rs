use std::path::PathBuf;

use clap::Parser;

/// Converse streaming chat client
#[derive(Debug, Parser)]
#[command(name = "converse", about = "Stream a chat reply from any configured LLM provider")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "converse.toml", env = "CONVERSE_CONFIG")]
    pub config: PathBuf,

    /// Provider id from the configuration
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model id
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Reasoning budget in tokens, 0 disables thinking
    #[arg(long)]
    pub thinking_budget: Option<i64>,

    /// Maximum output tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Image to attach to the prompt
    #[arg(short, long = "image")]
    pub images: Vec<PathBuf>,

    /// Describe tools in the system prompt instead of the native API
    #[arg(long)]
    pub prompt_tools: bool,

    /// Prompt text, read from stdin when omitted
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,
}
