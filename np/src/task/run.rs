//! Per-task execution context
//!
//! A `TaskRun` carries everything a pipeline stage needs: the state actor,
//! the LLM client, prompts, limits, the event emitter and the cancel token.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::LimitsConfig;
use crate::events::EventEmitter;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::prompts::PromptLoader;
use crate::state::{StateError, StateManager};
use crate::stream::{StreamMode, StreamOutcome, run_stream};
use crate::structured::parse_structured;

/// Errors that end a task
#[derive(Debug, Error)]
pub enum RunError {
    #[error("LLM request failed: {0}")]
    Transport(#[from] LlmError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Counters accumulated over one task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    /// Units whose result was committed
    pub committed: usize,
    /// Units left untouched
    pub skipped: usize,
    /// Soft failures
    pub warnings: usize,
    /// Audit findings reported
    pub findings: usize,
}

impl std::fmt::Display for TaskReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} committed, {} skipped, {} warnings",
            self.committed, self.skipped, self.warnings
        )?;
        if self.findings > 0 {
            write!(f, ", {} findings", self.findings)?;
        }
        Ok(())
    }
}

/// Execution context for one task
pub struct TaskRun {
    pub task_id: String,
    pub state: StateManager,
    pub llm: Arc<dyn LlmClient>,
    pub prompts: Arc<PromptLoader>,
    pub limits: LimitsConfig,
    /// Sampling temperature for every request of this task
    pub temperature: f32,
    pub emitter: EventEmitter,
    pub cancel: CancellationToken,
    pub report: TaskReport,
}

impl TaskRun {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop at a unit boundary when cancellation was requested
    pub fn check_cancel(&self) -> Result<(), RunError> {
        match self.cancel.is_cancelled() {
            true => {
                debug!(task_id = %self.task_id, "check_cancel: cancellation observed");
                Err(RunError::Cancelled)
            }
            false => Ok(()),
        }
    }

    /// Render a prompt template
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String, RunError> {
        self.prompts.render(name, context).map_err(|e| RunError::Prompt(e.to_string()))
    }

    /// Record a soft failure
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(task_id = %self.task_id, %message, "Task warning");
        self.report.warnings += 1;
        self.emitter.warning(message);
    }

    /// Stream a prose request; returns the raw buffer including any summary
    pub async fn stream_prose(&self, system: String, user: String) -> Result<String, RunError> {
        debug!(task_id = %self.task_id, "stream_prose: called");
        let request = CompletionRequest::new(system, user, self.temperature);
        match run_stream(self.llm.as_ref(), request, StreamMode::Prose, &self.emitter, &self.cancel).await? {
            StreamOutcome::Finished(raw) => Ok(raw),
            StreamOutcome::Cancelled => Err(RunError::Cancelled),
        }
    }

    /// Stream a JSON-object request and parse it
    ///
    /// A reply that does not parse is reported as a warning and yields `None`;
    /// the caller skips the unit.
    pub async fn stream_structured<T: DeserializeOwned>(
        &mut self,
        system: String,
        user: String,
        unit: &str,
    ) -> Result<Option<T>, RunError> {
        debug!(task_id = %self.task_id, %unit, "stream_structured: called");
        let request = CompletionRequest::new(system, user, self.temperature).json();
        self.stream_json(request, unit).await
    }

    /// Like `stream_structured`, but with no output cap
    ///
    /// Used by repair passes whose reply carries a full chapter.
    pub async fn stream_rewrite<T: DeserializeOwned>(
        &mut self,
        system: String,
        user: String,
        unit: &str,
    ) -> Result<Option<T>, RunError> {
        debug!(task_id = %self.task_id, %unit, "stream_rewrite: called");
        let request = CompletionRequest::new(system, user, self.temperature).json().uncapped();
        self.stream_json(request, unit).await
    }

    async fn stream_json<T: DeserializeOwned>(
        &mut self,
        request: CompletionRequest,
        unit: &str,
    ) -> Result<Option<T>, RunError> {
        let raw = match run_stream(self.llm.as_ref(), request, StreamMode::Structured, &self.emitter, &self.cancel)
            .await?
        {
            StreamOutcome::Finished(raw) => raw,
            StreamOutcome::Cancelled => return Err(RunError::Cancelled),
        };

        match parse_structured::<T>(&raw) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                self.warn(format!("{}: unusable structured reply ({}), skipping", unit, e));
                Ok(None)
            }
        }
    }
}
