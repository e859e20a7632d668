//! LLM request and response types

use serde::{Deserialize, Serialize};

/// A single chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System message
    pub system_prompt: String,
    /// User message
    pub user_prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output cap; the client's configured limit applies when unset
    pub max_tokens: Option<u32>,
    /// Ask the backend for a strict JSON object
    pub json_mode: bool,
    /// Send no output cap at all; whole-chapter rewrites must not be cut short
    pub uncapped: bool,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature,
            max_tokens: None,
            json_mode: false,
            uncapped: false,
        }
    }

    /// Request structured JSON output
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Leave the output length to the backend
    pub fn uncapped(mut self) -> Self {
        self.uncapped = true;
        self.max_tokens = None;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Buffered completion result
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Final content text
    pub content: Option<String>,
    /// Reasoning text, when the model exposes it
    pub reasoning: Option<String>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Response carrying only content text
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
}

/// Token accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One streamed delta
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Reasoning fragment, display only
    ReasoningDelta(String),
    /// Content fragment
    TextDelta(String),
    /// End of message
    MessageDone { stop_reason: StopReason, usage: TokenUsage },
}
