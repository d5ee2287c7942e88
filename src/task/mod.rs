// src/task/mod.rs

//! Units of ETL work.
//!
//! A [`Task`] is a stable id, its upstream ids, a [`RetryPolicy`] and a
//! [`TaskKind`]. Every kind implements the same contract: given a
//! [`TaskContext`], talk to the warehouse and return a [`TaskResult`].
//!
//! - [`stage`] replaces a staging table from object storage.
//! - [`load`] appends (or reloads) fact and dimension tables.
//! - [`quality`] runs read-only checks.
//! - [`locator`] turns a stage source template into concrete URIs.

pub mod context;
pub mod load;
pub mod locator;
pub mod quality;
pub mod retry;
pub mod stage;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::engine::TaskId;
use crate::warehouse::{CredentialProvider, WarehouseClient};

pub use context::{RunContext, TaskContext, TaskResult, TaskSummary};
pub use load::{DedupeKey, LoadSpec};
pub use locator::{SourceLocation, SourceLocator, StageSource};
pub use quality::{CompareOp, Expectation, QualityCheck, QualityGate};
pub use retry::{Backoff, RetryPolicy};
pub use stage::StageSpec;

/// What a task does when it runs.
#[derive(Debug, Clone)]
pub enum TaskKind {
    Stage(StageSpec),
    LoadFact(LoadSpec),
    LoadDimension(LoadSpec),
    QualityGate(QualityGate),
    /// No-op start/end marker.
    Marker,
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Stage(_) => "stage",
            TaskKind::LoadFact(_) => "fact",
            TaskKind::LoadDimension(_) => "dimension",
            TaskKind::QualityGate(_) => "quality",
            TaskKind::Marker => "marker",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// External collaborators a task may call.
#[derive(Clone)]
pub struct TaskServices {
    pub warehouse: Arc<dyn WarehouseClient>,
    pub credentials: Arc<dyn CredentialProvider>,
}

impl fmt::Debug for TaskServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskServices").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub upstream: BTreeSet<TaskId>,
    pub retry: RetryPolicy,
    pub kind: TaskKind,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            upstream: BTreeSet::new(),
            retry: RetryPolicy::once(),
            kind,
        }
    }

    pub fn marker(id: impl Into<TaskId>) -> Self {
        Self::new(id, TaskKind::Marker)
    }

    pub fn after(mut self, upstream: impl Into<TaskId>) -> Self {
        self.upstream.insert(upstream.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one attempt of this task.
    pub async fn execute(&self, ctx: &TaskContext, services: &TaskServices) -> TaskResult {
        debug!(task = %self.id, kind = %self.kind, attempt = ctx.attempt, "executing task");

        match &self.kind {
            TaskKind::Stage(spec) => stage::execute(spec, ctx, services).await,
            TaskKind::LoadFact(spec) | TaskKind::LoadDimension(spec) => {
                load::execute(spec, ctx, services).await
            }
            TaskKind::QualityGate(gate) => quality::execute(gate, ctx, services).await,
            TaskKind::Marker => Ok(TaskSummary::default()),
        }
    }
}
