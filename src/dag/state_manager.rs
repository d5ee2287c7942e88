// src/dag/state_manager.rs

//! Per-run state transitions shared by the scheduler's step functions.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::dag::task_info::{RunState, ScheduledTask, TaskState};
use crate::dag::DependencyGraph;
use crate::engine::TaskId;

/// Applies graph-aware transitions to a [`RunState`].
pub struct StateManager<'a> {
    graph: &'a DependencyGraph,
    state: &'a mut RunState,
    run_id: u64,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DependencyGraph, state: &'a mut RunState, run_id: u64) -> Self {
        Self {
            graph,
            state,
            run_id,
        }
    }

    /// Mark every transitive dependent of `failed_task` that has not run yet
    /// as `Skipped`.
    ///
    /// Returns the newly skipped tasks.
    pub fn mark_downstream_skipped(&mut self, failed_task: &str) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.graph.dependents_of(failed_task).to_vec();
        let mut newly_skipped = Vec::new();

        while let Some(id) = stack.pop() {
            if self.state.state_of(&id) != Some(TaskState::Pending) {
                // Already terminal or reached through another path.
                continue;
            }

            self.state.set(&id, TaskState::Skipped);
            debug!(
                task = %id,
                upstream = %failed_task,
                run_id = self.run_id,
                "marking task Skipped due to upstream failure"
            );
            stack.extend(self.graph.dependents_of(&id).iter().cloned());
            newly_skipped.push(id);
        }

        newly_skipped
    }

    /// Move every ready task to `Running` and return it as a
    /// [`ScheduledTask`], in topological order.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        // Decide first, then mutate.
        let ready = self.graph.ready_tasks(&*self.state);

        let mut scheduled = Vec::with_capacity(ready.len());
        for id in self.graph.topological_order() {
            if !ready.contains(id) {
                continue;
            }

            let attempt = self.state.begin_attempt(id);
            self.state.set(id, TaskState::Running);

            if attempt > 1 {
                info!(task = %id, run_id = self.run_id, attempt, "scheduling retry attempt");
            } else {
                info!(task = %id, run_id = self.run_id, "scheduling task");
            }

            let upstream: BTreeMap<TaskId, TaskState> = self
                .graph
                .dependencies_of(id)
                .iter()
                .filter_map(|dep| self.state.state_of(dep).map(|s| (dep.clone(), s)))
                .collect();

            scheduled.push(ScheduledTask {
                id: id.clone(),
                attempt,
                run_id: self.run_id,
                upstream,
            });
        }

        scheduled
    }

    /// Turn every still-`Pending` task into `Skipped`.
    pub fn skip_all_pending(&mut self) -> Vec<TaskId> {
        let pending = self.state.ids_in(TaskState::Pending);
        for id in &pending {
            self.state.set(id, TaskState::Skipped);
        }
        pending.into_iter().collect()
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.graph.is_terminal(&*self.state)
    }
}
