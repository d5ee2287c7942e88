// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::{RetryRequest, ScheduledTask};
use crate::engine::TaskId;

/// Structured result of a single scheduler "step".
///
/// The runtime turns this into executor dispatches and retry timers; tests
/// use it to step the DAG by hand.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready to run as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Failed attempts that should be tried again after a delay.
    pub retries: Vec<RetryRequest>,
    /// Tasks that reached `Failed` or `AttemptsExhausted` in this step.
    pub newly_failed: Vec<TaskId>,
    /// Tasks that were skipped because of an upstream failure or an abort.
    pub newly_skipped: Vec<TaskId>,
    /// Whether this step brought every task to a terminal state.
    pub run_just_finished: bool,
}
