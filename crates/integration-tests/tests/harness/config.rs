//! Provider configurations pointed at a mock vendor

use std::sync::Arc;

use converse_config::ProviderConfig;
use converse_llm::{ChatParams, Message};

/// Provider of the given kind with a test key
pub fn provider(id: &str, provider_type: &str, base_url: &str) -> ProviderConfig {
    ProviderConfig::new(id, provider_type, base_url).with_api_key("test-key")
}

/// Single user turn against `provider`
pub fn params(provider: ProviderConfig, model: &str, prompt: &str) -> ChatParams {
    ChatParams::new(Arc::new(provider), model, vec![Message::user(prompt)])
}

/// Drain a chunk stream into its chunks
pub async fn collect(
    mut stream: converse_llm::ChunkStream,
) -> Result<Vec<converse_llm::ChatStreamChunk>, converse_llm::LlmError> {
    use futures_util::StreamExt;

    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk?);
    }
    Ok(chunks)
}

/// Concatenated content
pub fn content(chunks: &[converse_llm::ChatStreamChunk]) -> String {
    chunks.iter().filter_map(|c| c.content.as_deref()).collect()
}

/// Concatenated reasoning
pub fn reasoning(chunks: &[converse_llm::ChatStreamChunk]) -> String {
    chunks.iter().filter_map(|c| c.reasoning.as_deref()).collect()
}
