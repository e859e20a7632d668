//! Event types for task activity streaming
//!
//! These events represent all observable activity of a task:
//! - Task lifecycle (started, stage changes, finished)
//! - Streaming output (reasoning and content deltas)
//! - Unit progress (started, completed, skipped)
//! - Diagnostics (status lines, logs, warnings, errors)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishKind {
    Completed,
    Cancelled,
    Failed,
}

impl std::fmt::Display for FinishKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishKind::Completed => write!(f, "completed"),
            FinishKind::Cancelled => write!(f, "cancelled"),
            FinishKind::Failed => write!(f, "failed"),
        }
    }
}

/// Core event enum - the vocabulary of task activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NpEvent {
    // === Task Lifecycle ===
    /// A task has started
    TaskStarted {
        task_id: String,
        kind: String,
        description: String,
    },
    /// The pipeline moved to a new stage
    StageChanged {
        task_id: String,
        stage_index: usize,
        stage_name: String,
        total_stages: usize,
    },
    /// A task has ended; emitted exactly once per task
    TaskFinished {
        task_id: String,
        outcome: FinishKind,
        message: Option<String>,
    },

    // === Streaming ===
    /// Reasoning fragment, display only
    ReasoningDelta { task_id: String, text: String },
    /// Prose fragment for live display
    ContentDelta { task_id: String, text: String },
    /// Replace the live view with cleaned prose
    ContentReset { task_id: String, text: String },

    // === Units ===
    /// Work on a chapter or volume began
    UnitStarted {
        task_id: String,
        volume: String,
        chapter: Option<String>,
    },
    /// A unit's result was committed
    UnitCompleted {
        task_id: String,
        volume: String,
        chapter: Option<String>,
        detail: String,
    },
    /// A unit was left untouched
    UnitSkipped {
        task_id: String,
        volume: String,
        chapter: Option<String>,
        reason: String,
    },

    // === Diagnostics ===
    /// Human-readable progress line
    Status { task_id: String, message: String },
    /// Diagnostic log line (repair notes, collisions)
    Log { task_id: String, message: String },
    /// Soft failure; the run continues
    Warning { task_id: String, message: String },
    /// Terminal failure
    Error { task_id: String, message: String },
}

impl NpEvent {
    /// Get the task ID for this event
    pub fn task_id(&self) -> &str {
        match self {
            NpEvent::TaskStarted { task_id, .. }
            | NpEvent::StageChanged { task_id, .. }
            | NpEvent::TaskFinished { task_id, .. }
            | NpEvent::ReasoningDelta { task_id, .. }
            | NpEvent::ContentDelta { task_id, .. }
            | NpEvent::ContentReset { task_id, .. }
            | NpEvent::UnitStarted { task_id, .. }
            | NpEvent::UnitCompleted { task_id, .. }
            | NpEvent::UnitSkipped { task_id, .. }
            | NpEvent::Status { task_id, .. }
            | NpEvent::Log { task_id, .. }
            | NpEvent::Warning { task_id, .. }
            | NpEvent::Error { task_id, .. } => task_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            NpEvent::TaskStarted { .. } => "TaskStarted",
            NpEvent::StageChanged { .. } => "StageChanged",
            NpEvent::TaskFinished { .. } => "TaskFinished",
            NpEvent::ReasoningDelta { .. } => "ReasoningDelta",
            NpEvent::ContentDelta { .. } => "ContentDelta",
            NpEvent::ContentReset { .. } => "ContentReset",
            NpEvent::UnitStarted { .. } => "UnitStarted",
            NpEvent::UnitCompleted { .. } => "UnitCompleted",
            NpEvent::UnitSkipped { .. } => "UnitSkipped",
            NpEvent::Status { .. } => "Status",
            NpEvent::Log { .. } => "Log",
            NpEvent::Warning { .. } => "Warning",
            NpEvent::Error { .. } => "Error",
        }
    }

    /// Streaming deltas are high-volume and not worth persisting
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            NpEvent::ReasoningDelta { .. } | NpEvent::ContentDelta { .. } | NpEvent::ContentReset { .. }
        )
    }
}

/// Event log entry for persistence (JSONL format)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: NpEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: NpEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = NpEvent::TaskFinished {
            task_id: "t-1".to_string(),
            outcome: FinishKind::Cancelled,
            message: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"TaskFinished""#));
        assert!(json.contains(r#""outcome":"cancelled""#));

        let back: NpEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id(), "t-1");
        assert_eq!(back.event_type(), "TaskFinished");
    }

    #[test]
    fn test_is_delta() {
        let delta = NpEvent::ContentDelta {
            task_id: "t".to_string(),
            text: "x".to_string(),
        };
        let status = NpEvent::Status {
            task_id: "t".to_string(),
            message: "x".to_string(),
        };
        assert!(delta.is_delta());
        assert!(!status.is_delta());
    }

    #[test]
    fn test_log_entry_has_timestamp() {
        let entry = EventLogEntry::new(NpEvent::Log {
            task_id: "t".to_string(),
            message: "hello".to_string(),
        });
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""ts""#));
        assert!(json.contains("hello"));
    }
}
