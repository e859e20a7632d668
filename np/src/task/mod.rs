//! Background tasks
//!
//! A task is one user-initiated operation (generate, autopilot, correct,
//! audit) running off the caller's thread with its own cancel token and
//! event stream.

mod controller;
mod run;

pub use controller::{TaskController, TaskError, TaskKind, TaskOutcome};
pub use run::{RunError, TaskReport, TaskRun};

#[cfg(test)]
pub(crate) use run::testing;
