// src/dag/report.rs

//! Final outcome of one run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::dag::task_info::{RunState, TaskState};
use crate::engine::TaskId;
use crate::errors::QualityFailure;

/// Which tasks succeeded, failed or were skipped, plus the first quality
/// check failure if there was one.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: u64,
    pub succeeded: BTreeSet<TaskId>,
    /// Non-retryable failures (quality checks, aborts, template errors).
    pub failed: BTreeSet<TaskId>,
    /// Tasks whose last permitted attempt failed.
    pub exhausted: BTreeSet<TaskId>,
    pub skipped: BTreeSet<TaskId>,
    pub attempts: BTreeMap<TaskId, u32>,
    pub first_quality_failure: Option<QualityFailure>,
    pub aborted: bool,
}

impl RunReport {
    pub(crate) fn from_state(
        run_id: u64,
        state: &RunState,
        first_quality_failure: Option<QualityFailure>,
        aborted: bool,
    ) -> Self {
        let mut skipped = state.ids_in(TaskState::Skipped);
        // Anything not terminal at report time never got to run to completion.
        skipped.extend(state.ids_in(TaskState::Pending));
        skipped.extend(state.ids_in(TaskState::Running));

        Self {
            run_id,
            succeeded: state.ids_in(TaskState::Succeeded),
            failed: state.ids_in(TaskState::Failed),
            exhausted: state.ids_in(TaskState::AttemptsExhausted),
            skipped,
            attempts: state.attempts().clone(),
            first_quality_failure,
            aborted,
        }
    }

    /// Every task that did not succeed by its own fault: `failed ∪ exhausted`.
    pub fn failed_ids(&self) -> BTreeSet<TaskId> {
        self.failed.union(&self.exhausted).cloned().collect()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted
            && self.failed.is_empty()
            && self.exhausted.is_empty()
            && self.skipped.is_empty()
    }
}

fn write_ids(f: &mut fmt::Formatter<'_>, label: &str, ids: &BTreeSet<TaskId>) -> fmt::Result {
    if ids.is_empty() {
        return Ok(());
    }
    let joined: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    writeln!(f, "  {label:<10} ({}): {}", ids.len(), joined.join(", "))
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_success() {
            "succeeded"
        } else if self.aborted {
            "aborted"
        } else {
            "failed"
        };
        writeln!(f, "run {} {status}", self.run_id)?;
        write_ids(f, "succeeded", &self.succeeded)?;
        write_ids(f, "failed", &self.failed)?;
        write_ids(f, "exhausted", &self.exhausted)?;
        write_ids(f, "skipped", &self.skipped)?;

        if let Some(failure) = &self.first_quality_failure {
            writeln!(f, "  {failure}")?;
        }
        Ok(())
    }
}
