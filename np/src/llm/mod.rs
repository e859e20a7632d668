//! LLM client abstraction
//!
//! Chat-style requests with a system and a user message, optionally
//! constrained to a JSON object, optionally streamed as reasoning and
//! content deltas.

mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
#[cfg(test)]
pub use client::mock;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, StopReason, StreamChunk, TokenUsage};

use std::sync::Arc;

use crate::config::LlmConfig;

/// Create an LLM client for the configured provider
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    tracing::debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "deepseek" | "openai" => Ok(Arc::new(OpenAIClient::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!("Unknown LLM provider: {}", other))),
    }
}
