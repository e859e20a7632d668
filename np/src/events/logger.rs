//! Event Logger - persists task events to JSONL files
//!
//! Subscribes to the EventBus and writes each task's events to
//! `{runs_dir}/{task-id}/events.jsonl`. Streaming deltas are not persisted.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, NpEvent};

/// Event logger that writes events to JSONL files
pub struct EventLogger {
    /// Base directory for run data
    runs_dir: PathBuf,
    /// Open file writers per task
    writers: HashMap<String, BufWriter<File>>,
}

impl EventLogger {
    /// Create a new event logger
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        let runs_dir = runs_dir.as_ref().to_path_buf();
        debug!(?runs_dir, "EventLogger::new: creating logger");
        Self {
            runs_dir,
            writers: HashMap::new(),
        }
    }

    /// Write an event to its task's log file
    pub fn write_event(&mut self, event: &NpEvent) -> eyre::Result<()> {
        if event.is_delta() {
            return Ok(());
        }

        let task_id = event.task_id().to_string();
        if !self.writers.contains_key(&task_id) {
            let task_dir = self.runs_dir.join(&task_id);
            fs::create_dir_all(&task_dir)?;

            let log_path = task_dir.join("events.jsonl");
            debug!(?log_path, "EventLogger: creating new log file");

            let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
            self.writers.insert(task_id.clone(), BufWriter::new(file));
        }

        let Some(writer) = self.writers.get_mut(&task_id) else {
            return Err(eyre::eyre!("No writer for task {}", task_id));
        };

        let entry = EventLogEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        Ok(())
    }

    /// Close the writer for a task
    pub fn close_task(&mut self, task_id: &str) {
        debug!(%task_id, "EventLogger::close_task");
        if let Some(mut writer) = self.writers.remove(task_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events from the bus until the channel closes
    pub async fn run(mut self, mut rx: broadcast::Receiver<NpEvent>) {
        debug!("EventLogger::run: starting event logger");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let task_id = event.task_id().to_string();
                    let is_finished = matches!(event, NpEvent::TaskFinished { .. });

                    if let Err(e) = self.write_event(&event) {
                        error!(%task_id, error = %e, "EventLogger: failed to write event");
                    }

                    if is_finished {
                        self.close_task(&task_id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (task_id, mut writer) in self.writers.drain() {
            debug!(%task_id, "EventLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read events from a task's log file
pub fn read_task_events(runs_dir: impl AsRef<Path>, task_id: &str) -> eyre::Result<Vec<EventLogEntry>> {
    let log_path = runs_dir.as_ref().join(task_id).join("events.jsonl");
    debug!(?log_path, "read_task_events: reading log file");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_task_events: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_task_events: loaded entries");
    Ok(entries)
}

/// Spawn the event logger as a background task
///
/// Subscribes before returning so no event emitted afterwards is missed.
pub fn spawn_event_logger(event_bus: &Arc<EventBus>, runs_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(runs_dir);
    let rx = event_bus.subscribe();
    tokio::spawn(logger.run(rx))
}
