// src/task/context.rs

//! Values flowing into and out of a task execution.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::dag::TaskState;
use crate::engine::TaskId;
use crate::errors::TaskError;

/// What the host passes when it triggers one logical run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// The point in time this run covers (not the wall-clock start time).
    pub logical_run_time: DateTime<Utc>,
    /// Extra template parameters available to source key templates.
    pub params: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(logical_run_time: DateTime<Utc>) -> Self {
        Self {
            logical_run_time,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Run-time view handed to a single task attempt.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: u64,
    pub task_id: TaskId,
    /// 1 for the first try.
    pub attempt: u32,
    pub logical_run_time: DateTime<Utc>,
    pub params: BTreeMap<String, String>,
    /// State of each direct upstream task at dispatch time.
    pub upstream: BTreeMap<TaskId, TaskState>,
}

impl TaskContext {
    pub fn new(
        run: &RunContext,
        run_id: u64,
        task_id: TaskId,
        attempt: u32,
        upstream: BTreeMap<TaskId, TaskState>,
    ) -> Self {
        Self {
            run_id,
            task_id,
            attempt,
            logical_run_time: run.logical_run_time,
            params: run.params.clone(),
            upstream,
        }
    }
}

/// What a successful attempt reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    /// Statements and queries sent to the warehouse.
    pub statements: u32,
    pub note: Option<String>,
}

impl TaskSummary {
    pub fn new(statements: u32) -> Self {
        Self {
            statements,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

pub type TaskResult = Result<TaskSummary, TaskError>;
