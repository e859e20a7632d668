//! NovelPilot - autonomous multi-stage novel generation
//!
//! NovelPilot drives a language model through the life of a serialized
//! novel organized as Book → Volume → Chapter: planning volumes, planning
//! chapters, writing prose with continuity context, and auditing and
//! repairing continuity errors.
//!
//! # Core Concepts
//!
//! - **Stateless calls**: every request carries its full context; memory
//!   lives in per-chapter AI summaries, not in a conversation
//! - **Protective merge**: AI text replaces stored text only when strictly longer
//! - **Idempotent pipeline**: finished units are skipped, so reruns resume
//! - **One task at a time**: background tasks are cancellable and observable
//!
//! # Modules
//!
//! - [`context`] - Context assembly for prompts
//! - [`stream`] - Streaming response handling and summary splitting
//! - [`pipeline`] - Volume planner, chapter planner, content generator
//! - [`correction`] - Conflict audit and repair passes
//! - [`state`] - Actor owning the document store
//! - [`task`] - Background task controller
//! - [`events`] - Event bus and JSONL event log
//! - [`llm`] - LLM client trait and OpenAI-compatible implementation
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod context;
pub mod correction;
pub mod events;
pub mod llm;
pub mod merge;
pub mod pipeline;
pub mod prompts;
pub mod state;
pub mod stream;
pub mod structured;
pub mod task;

// Re-export commonly used types
pub use config::{Config, LimitsConfig, LlmConfig, TemperatureConfig};
pub use correction::{CorrectionMode, CorrectionScope};
pub use events::{EventBus, EventEmitter, FinishKind, NpEvent};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, StreamChunk, create_client};
pub use prompts::PromptLoader;
pub use state::{StateError, StateEvent, StateManager};
pub use task::{TaskController, TaskError, TaskKind, TaskOutcome, TaskReport};
