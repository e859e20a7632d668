//! Event Bus - central pub/sub for task activity
//!
//! Uses a tokio broadcast channel so any number of passive observers
//! (terminal renderer, file logger) can follow a task without the core
//! knowing about them.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{FinishKind, NpEvent};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Central event bus
pub struct EventBus {
    tx: broadcast::Sender<NpEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: NpEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<NpEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one task
    pub fn emitter_for(&self, task_id: impl Into<String>) -> EventEmitter {
        let task_id = task_id.into();
        debug!(%task_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            task_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Cloneable handle that stamps every event with its task ID
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<NpEvent>,
    task_id: String,
}

impl EventEmitter {
    /// Emitter whose events go nowhere
    pub fn detached(task_id: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            task_id: task_id.into(),
        }
    }

    /// Get the task ID this emitter is bound to
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: NpEvent) {
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn task_started(&self, kind: &str, description: &str) {
        self.emit(NpEvent::TaskStarted {
            task_id: self.task_id.clone(),
            kind: kind.to_string(),
            description: description.to_string(),
        });
    }

    pub fn stage_changed(&self, stage_index: usize, stage_name: &str, total_stages: usize) {
        self.emit(NpEvent::StageChanged {
            task_id: self.task_id.clone(),
            stage_index,
            stage_name: stage_name.to_string(),
            total_stages,
        });
    }

    pub fn task_finished(&self, outcome: FinishKind, message: Option<String>) {
        self.emit(NpEvent::TaskFinished {
            task_id: self.task_id.clone(),
            outcome,
            message,
        });
    }

    pub fn reasoning(&self, text: &str) {
        self.emit(NpEvent::ReasoningDelta {
            task_id: self.task_id.clone(),
            text: text.to_string(),
        });
    }

    pub fn content(&self, text: &str) {
        self.emit(NpEvent::ContentDelta {
            task_id: self.task_id.clone(),
            text: text.to_string(),
        });
    }

    pub fn content_reset(&self, text: &str) {
        self.emit(NpEvent::ContentReset {
            task_id: self.task_id.clone(),
            text: text.to_string(),
        });
    }

    pub fn unit_started(&self, volume: &str, chapter: Option<&str>) {
        self.emit(NpEvent::UnitStarted {
            task_id: self.task_id.clone(),
            volume: volume.to_string(),
            chapter: chapter.map(str::to_string),
        });
    }

    pub fn unit_completed(&self, volume: &str, chapter: Option<&str>, detail: &str) {
        self.emit(NpEvent::UnitCompleted {
            task_id: self.task_id.clone(),
            volume: volume.to_string(),
            chapter: chapter.map(str::to_string),
            detail: detail.to_string(),
        });
    }

    pub fn unit_skipped(&self, volume: &str, chapter: Option<&str>, reason: &str) {
        self.emit(NpEvent::UnitSkipped {
            task_id: self.task_id.clone(),
            volume: volume.to_string(),
            chapter: chapter.map(str::to_string),
            reason: reason.to_string(),
        });
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(NpEvent::Status {
            task_id: self.task_id.clone(),
            message: message.into(),
        });
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(NpEvent::Log {
            task_id: self.task_id.clone(),
            message: message.into(),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(NpEvent::Warning {
            task_id: self.task_id.clone(),
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NpEvent::Error {
            task_id: self.task_id.clone(),
            message: message.into(),
        });
    }
}
