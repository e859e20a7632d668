//! Event stream for live observation of tasks
//!
//! Every significant action of a running task emits an event. Consumers
//! (terminal renderer, JSONL logger) subscribe to the bus; the core never
//! depends on any of them.
//!
//! ```text
//!   TaskController    Pipeline stages    Corrector
//!        │                  │                │
//!        └──────────► EVENT BUS ◄────────────┘
//!                (tokio broadcast channel)
//!                    │              │
//!              Terminal view    events.jsonl
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter};
pub use logger::{EventLogger, read_task_events, spawn_event_logger};
pub use types::{EventLogEntry, FinishKind, NpEvent};
