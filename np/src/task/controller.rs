//! TaskController - runs at most one background task at a time
//!
//! The controller:
//! - Rejects a new task while one is active
//! - Claims the task's scope in the state actor so structural edits to it
//!   are refused while it runs
//! - Emits exactly one TaskStarted and one TaskFinished per task
//! - Cancels cooperatively through a CancellationToken

use std::sync::Arc;

use bookstore::ChapterRef;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, TemperatureConfig};
use crate::correction::{self, CorrectionMode, CorrectionScope};
use crate::events::{EventBus, FinishKind};
use crate::llm::LlmClient;
use crate::pipeline;
use crate::prompts::PromptLoader;
use crate::state::{StateError, StateManager, TaskScope};

use super::run::{RunError, TaskReport, TaskRun};

/// The kinds of background task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Write one chapter
    Generate { target: ChapterRef, force: bool },
    /// Plan volumes, plan chapters, write every pending chapter
    Autopilot,
    /// Audit and repair
    Correct {
        scope: CorrectionScope,
        mode: CorrectionMode,
    },
    /// Report conflicts without changing anything
    Audit,
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Generate { .. } => "generate",
            TaskKind::Autopilot => "autopilot",
            TaskKind::Correct { .. } => "correct",
            TaskKind::Audit => "audit",
        }
    }

    pub fn description(&self) -> String {
        match self {
            TaskKind::Generate { target, force } => match force {
                true => format!("Regenerate {}", target),
                false => format!("Generate {}", target),
            },
            TaskKind::Autopilot => "Plan and write the whole book".to_string(),
            TaskKind::Correct { scope, mode } => match scope {
                CorrectionScope::Full => format!("Correct the whole book ({})", mode),
                CorrectionScope::Chapter(target) => format!("Correct {} ({})", target, mode),
            },
            TaskKind::Audit => "Audit the book for conflicts".to_string(),
        }
    }

    /// What the task holds while it runs
    pub fn scope(&self) -> TaskScope {
        match self {
            TaskKind::Generate { target, .. } => TaskScope::Chapter(target.clone()),
            TaskKind::Correct {
                scope: CorrectionScope::Chapter(target),
                ..
            } => TaskScope::Chapter(target.clone()),
            TaskKind::Autopilot | TaskKind::Correct { .. } | TaskKind::Audit => TaskScope::Book,
        }
    }

    pub fn temperature(&self, temps: &TemperatureConfig) -> f32 {
        match self {
            TaskKind::Generate { .. } => temps.generation,
            TaskKind::Autopilot => temps.autopilot,
            TaskKind::Correct { .. } | TaskKind::Audit => temps.correction,
        }
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed(TaskReport),
    Cancelled(TaskReport),
    Failed { error: String, report: TaskReport },
}

impl TaskOutcome {
    pub fn finish_kind(&self) -> FinishKind {
        match self {
            TaskOutcome::Completed(_) => FinishKind::Completed,
            TaskOutcome::Cancelled(_) => FinishKind::Cancelled,
            TaskOutcome::Failed { .. } => FinishKind::Failed,
        }
    }

    pub fn report(&self) -> &TaskReport {
        match self {
            TaskOutcome::Completed(report) | TaskOutcome::Cancelled(report) => report,
            TaskOutcome::Failed { report, .. } => report,
        }
    }
}

/// Errors from the controller itself
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Another task is running: {0}")]
    Busy(String),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

struct ActiveTask {
    id: String,
    cancel: CancellationToken,
    /// Taken by `wait` while it awaits the task
    handle: Option<JoinHandle<TaskOutcome>>,
}

impl ActiveTask {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| !h.is_finished())
    }
}

/// Starts, cancels and awaits background tasks
pub struct TaskController {
    state: StateManager,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    config: Arc<Config>,
    bus: Arc<EventBus>,
    active: Mutex<Option<ActiveTask>>,
}

impl TaskController {
    pub fn new(
        state: StateManager,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLoader>,
        config: Arc<Config>,
        bus: Arc<EventBus>,
    ) -> Self {
        debug!("TaskController::new: called");
        Self {
            state,
            llm,
            prompts,
            config,
            bus,
            active: Mutex::new(None),
        }
    }

    /// Start a task in the background and return its ID
    pub async fn start(&self, kind: TaskKind) -> Result<String, TaskError> {
        debug!(kind = %kind.name(), "TaskController::start: called");
        let mut active = self.active.lock().await;
        if let Some(task) = active.as_ref()
            && task.is_running()
        {
            return Err(TaskError::Busy(task.id.clone()));
        }

        let task_id = Uuid::now_v7().to_string();
        self.state
            .claim(&task_id, kind.scope())
            .await
            .map_err(|e| match e {
                StateError::Busy(what) => TaskError::Busy(what),
                other => TaskError::State(other),
            })?;

        let cancel = CancellationToken::new();
        let run = TaskRun {
            task_id: task_id.clone(),
            state: self.state.clone(),
            llm: self.llm.clone(),
            prompts: self.prompts.clone(),
            limits: self.config.limits.clone(),
            temperature: kind.temperature(&self.config.temperature),
            emitter: self.bus.emitter_for(&task_id),
            cancel: cancel.clone(),
            report: TaskReport::default(),
        };

        info!(%task_id, kind = %kind.name(), "Starting task");
        let handle = tokio::spawn(run_task(kind, run));
        *active = Some(ActiveTask {
            id: task_id.clone(),
            cancel,
            handle: Some(handle),
        });
        Ok(task_id)
    }

    /// Request cancellation of the active task
    ///
    /// Returns false when nothing is running.
    pub async fn cancel(&self) -> bool {
        debug!("TaskController::cancel: called");
        match self.active.lock().await.as_ref() {
            Some(task) if task.is_running() => {
                info!(task_id = %task.id, "Cancelling task");
                task.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Wait for the active task to end
    pub async fn wait(&self) -> Option<TaskOutcome> {
        debug!("TaskController::wait: called");
        let (task_id, handle) = {
            let mut active = self.active.lock().await;
            let task = active.as_mut()?;
            (task.id.clone(), task.handle.take()?)
        };

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(%task_id, error = %e, "Task panicked");
                let _ = self.state.release(&task_id).await;
                TaskOutcome::Failed {
                    error: e.to_string(),
                    report: TaskReport::default(),
                }
            }
        };
        *self.active.lock().await = None;
        Some(outcome)
    }

    /// Whether a task is running
    pub async fn is_busy(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(ActiveTask::is_running)
    }

    /// ID of the running task
    pub async fn active_task_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|task| task.is_running())
            .map(|task| task.id.clone())
    }
}

/// Body of a background task
async fn run_task(kind: TaskKind, mut run: TaskRun) -> TaskOutcome {
    debug!(task_id = %run.task_id, kind = %kind.name(), "run_task: called");
    run.emitter.task_started(kind.name(), &kind.description());

    let result = match &kind {
        TaskKind::Generate { target, force } => pipeline::generate_chapter(&mut run, target, *force).await,
        TaskKind::Autopilot => pipeline::run_autopilot(&mut run).await,
        TaskKind::Correct { scope, mode } => correction::run_correction(&mut run, scope, *mode).await,
        TaskKind::Audit => correction::run_audit(&mut run).await,
    };

    if let Err(e) = run.state.release(&run.task_id).await {
        warn!(task_id = %run.task_id, error = %e, "Failed to release task claim");
    }

    let report = run.report.clone();
    let outcome = match result {
        Ok(()) if run.is_cancelled() => TaskOutcome::Cancelled(report),
        Ok(()) => TaskOutcome::Completed(report),
        Err(RunError::Cancelled) => TaskOutcome::Cancelled(report),
        Err(e) => {
            error!(task_id = %run.task_id, error = %e, "Task failed");
            run.emitter.error(e.to_string());
            TaskOutcome::Failed {
                error: e.to_string(),
                report,
            }
        }
    };

    info!(task_id = %run.task_id, outcome = %outcome.finish_kind(), report = %outcome.report(), "Task finished");
    let message = match &outcome {
        TaskOutcome::Failed { error, .. } => Some(error.clone()),
        other => Some(other.report().to_string()),
    };
    run.emitter.task_finished(outcome.finish_kind(), message);
    outcome
}
