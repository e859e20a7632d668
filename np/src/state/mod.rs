//! State management with actor pattern
//!
//! StateManager owns the DocumentStore and processes messages via channels,
//! providing serialized access to the book and chapter prose.

mod manager;
mod messages;

pub use manager::{StateEvent, StateManager};
pub use messages::{CommitReport, MetaEdit, StateCommand, StateError, StateResponse, TaskScope};
