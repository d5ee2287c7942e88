// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the DAG scheduler
//! - retry timers (backoff between attempts)
//! - the main runtime event loop that reacts to:
//!   - task completion events
//!   - retry deadlines
//!   - abort requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::errors::TaskError;
use crate::task::TaskResult;

/// Canonical task identifier used throughout the engine.
pub type TaskId = String;

/// Outcome of one task attempt, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success,
    Failed(TaskError),
}

impl From<TaskResult> for TaskOutcome {
    fn from(result: TaskResult) -> Self {
        match result {
            Ok(_) => TaskOutcome::Success,
            Err(e) => TaskOutcome::Failed(e),
        }
    }
}

/// Events flowing into the runtime from the executor and timers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// An attempt of a task finished.
    TaskCompleted {
        task: TaskId,
        attempt: u32,
        outcome: TaskOutcome,
    },
    /// The backoff delay of a failed task elapsed.
    RetryDue { task: TaskId },
    /// The host asked to stop the run.
    AbortRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
