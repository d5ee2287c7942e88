// src/dag/task_info.rs

//! Per-run task state and the scheduling records handed to the executor.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use crate::dag::DependencyGraph;
use crate::engine::TaskId;

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting for upstream tasks (or for its next attempt).
    Pending,
    /// Dispatched to the executor.
    Running,
    Succeeded,
    /// Failed and will not be retried, or (transiently) failed while a retry
    /// is scheduled.
    Failed,
    /// Never run because an upstream task did not succeed.
    Skipped,
    /// Failed on its last permitted attempt.
    AttemptsExhausted,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded
                | TaskState::Failed
                | TaskState::Skipped
                | TaskState::AttemptsExhausted
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
            TaskState::AttemptsExhausted => "attempts exhausted",
        };
        f.write_str(s)
    }
}

/// Mutable overlay over a [`DependencyGraph`] for one run.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    states: BTreeMap<TaskId, TaskState>,
    /// Attempts started so far, per task.
    attempts: BTreeMap<TaskId, u32>,
    /// Failed tasks whose next attempt is waiting on a backoff delay.
    awaiting_retry: BTreeSet<TaskId>,
}

impl RunState {
    /// Every task of `graph` starts `Pending`.
    pub fn new(graph: &DependencyGraph) -> Self {
        Self {
            states: graph
                .task_ids()
                .map(|id| (id.to_string(), TaskState::Pending))
                .collect(),
            attempts: BTreeMap::new(),
            awaiting_retry: BTreeSet::new(),
        }
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.states.get(id).copied()
    }

    pub fn attempts_of(&self, id: &str) -> u32 {
        self.attempts.get(id).copied().unwrap_or(0)
    }

    pub fn is_awaiting_retry(&self, id: &str) -> bool {
        self.awaiting_retry.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TaskState)> {
        self.states.iter().map(|(id, s)| (id.as_str(), *s))
    }

    /// Ids currently in `state`.
    pub fn ids_in(&self, state: TaskState) -> BTreeSet<TaskId> {
        self.states
            .iter()
            .filter(|(_, s)| **s == state)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn attempts(&self) -> &BTreeMap<TaskId, u32> {
        &self.attempts
    }

    pub(crate) fn set(&mut self, id: &str, state: TaskState) {
        if let Some(slot) = self.states.get_mut(id) {
            *slot = state;
        }
    }

    /// Record the start of a new attempt and return its number.
    pub(crate) fn begin_attempt(&mut self, id: &str) -> u32 {
        let n = self.attempts.entry(id.to_string()).or_insert(0);
        *n += 1;
        *n
    }

    pub(crate) fn park_for_retry(&mut self, id: &str) {
        self.awaiting_retry.insert(id.to_string());
    }

    /// Returns `true` if the task was parked.
    pub(crate) fn unpark(&mut self, id: &str) -> bool {
        self.awaiting_retry.remove(id)
    }

    pub(crate) fn parked(&self) -> Vec<TaskId> {
        self.awaiting_retry.iter().cloned().collect()
    }
}

/// A task the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: TaskId,
    /// 1 for the first try.
    pub attempt: u32,
    /// All tasks of one run share the same `run_id`.
    pub run_id: u64,
    /// Direct upstream states at dispatch time.
    pub upstream: BTreeMap<TaskId, TaskState>,
}

/// Ask the runtime to report [`crate::engine::RuntimeEvent::RetryDue`] for
/// `id` once `delay` has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub id: TaskId,
    /// The attempt that just failed.
    pub failed_attempt: u32,
    pub delay: Duration,
}
