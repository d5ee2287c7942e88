// src/dag/scheduler.rs

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::DependencyGraph;
use crate::dag::report::RunReport;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{RetryRequest, RunState, TaskState};
use crate::engine::{TaskId, TaskOutcome};
use crate::errors::QualityFailure;

/// Scheduler holds the immutable DAG plus the mutable state of one run.
///
/// It is responsible for:
/// - deciding which tasks are ready (all upstream succeeded)
/// - recording successes and failures
/// - asking for retries while a task has attempts left
/// - skipping the downstream subtree of a task that failed for good
///
/// It performs no IO; the runtime feeds it completions and executes the
/// returned [`SchedulerStep`]s.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<DependencyGraph>,
    state: RunState,
    run_id: u64,
    started: bool,
    finished: bool,
    aborted: bool,
    first_quality_failure: Option<QualityFailure>,
}

impl Scheduler {
    pub fn new(graph: Arc<DependencyGraph>, run_id: u64) -> Self {
        let state = RunState::new(&graph);
        Self {
            graph,
            state,
            run_id,
            started: false,
            finished: false,
            aborted: false,
            first_quality_failure: None,
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn run_state(&self) -> &RunState {
        &self.state
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.state.state_of(task)
    }

    /// Whether every task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.graph.is_terminal(&self.state)
    }

    /// Snapshot of the run's outcome so far.
    pub fn report(&self) -> RunReport {
        RunReport::from_state(
            self.run_id,
            &self.state,
            self.first_quality_failure.clone(),
            self.aborted,
        )
    }

    /// Schedule the root tasks. Calling it twice is a no-op.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!(run_id = self.run_id, "scheduler already started; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;
        debug!(run_id = self.run_id, tasks = self.graph.len(), "scheduler: starting run");

        let mut manager = StateManager::new(&self.graph, &mut self.state, self.run_id);
        let newly_scheduled = manager.collect_new_ready_tasks();

        SchedulerStep {
            newly_scheduled,
            run_just_finished: self.maybe_finish_run(),
            ..SchedulerStep::default()
        }
    }

    /// Record the outcome of `attempt` of `task`.
    pub fn handle_completion(
        &mut self,
        task: &str,
        attempt: u32,
        outcome: TaskOutcome,
    ) -> SchedulerStep {
        if self.state.state_of(task) != Some(TaskState::Running) {
            warn!(
                task = %task,
                run_id = self.run_id,
                state = ?self.state.state_of(task),
                "completion for a task that is not running; ignoring"
            );
            return SchedulerStep::default();
        }

        let mut step = SchedulerStep::default();

        match outcome {
            TaskOutcome::Success => {
                self.state.set(task, TaskState::Succeeded);
                debug!(task = %task, run_id = self.run_id, attempt, "task succeeded");

                if !self.aborted {
                    let mut manager = StateManager::new(&self.graph, &mut self.state, self.run_id);
                    step.newly_scheduled = manager.collect_new_ready_tasks();
                }
            }
            TaskOutcome::Failed(error) => {
                if let Some(failure) = error.quality_failure() {
                    self.first_quality_failure.get_or_insert_with(|| failure.clone());
                }

                let retry_delay = if error.is_retryable() && !self.aborted {
                    self.graph
                        .task(task)
                        .and_then(|t| t.retry.delay_after_attempt(attempt))
                } else {
                    None
                };

                match retry_delay {
                    Some(delay) => {
                        warn!(
                            task = %task,
                            run_id = self.run_id,
                            attempt,
                            error = %error,
                            delay_ms = delay.as_millis() as u64,
                            "task failed; retrying after backoff"
                        );
                        self.state.set(task, TaskState::Failed);
                        self.state.park_for_retry(task);
                        step.retries.push(RetryRequest {
                            id: task.to_string(),
                            failed_attempt: attempt,
                            delay,
                        });
                    }
                    None => {
                        let terminal = if error.is_retryable() && !self.aborted {
                            TaskState::AttemptsExhausted
                        } else {
                            TaskState::Failed
                        };
                        warn!(
                            task = %task,
                            run_id = self.run_id,
                            attempt,
                            error = %error,
                            state = %terminal,
                            "task failed for good; skipping downstream tasks"
                        );
                        step.newly_failed.push(task.to_string());
                        step.newly_skipped = self.fail_task(task, terminal);
                    }
                }
            }
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// A retry backoff elapsed: put the task back in line.
    pub fn handle_retry_due(&mut self, task: &str) -> SchedulerStep {
        if !self.state.unpark(task) {
            debug!(task = %task, run_id = self.run_id, "retry due for a task not awaiting retry; ignoring");
            return SchedulerStep::default();
        }

        let mut step = SchedulerStep::default();

        if self.aborted {
            step.newly_failed.push(task.to_string());
            step.newly_skipped = self.fail_task(task, TaskState::Failed);
        } else {
            self.state.set(task, TaskState::Pending);
            let mut manager = StateManager::new(&self.graph, &mut self.state, self.run_id);
            step.newly_scheduled = manager.collect_new_ready_tasks();
        }

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    /// Stop the run: nothing new starts, pending retries are abandoned.
    ///
    /// Running tasks keep their state until their completion arrives.
    pub fn abort(&mut self) -> SchedulerStep {
        if self.aborted {
            return SchedulerStep::default();
        }
        self.aborted = true;
        info!(run_id = self.run_id, "scheduler: run aborted");

        let mut step = SchedulerStep::default();

        for task in self.state.parked() {
            self.state.unpark(&task);
            step.newly_failed.push(task.clone());
            let mut skipped = self.fail_task(&task, TaskState::Failed);
            step.newly_skipped.append(&mut skipped);
        }

        let mut manager = StateManager::new(&self.graph, &mut self.state, self.run_id);
        step.newly_skipped.append(&mut manager.skip_all_pending());

        step.run_just_finished = self.maybe_finish_run();
        step
    }

    fn fail_task(&mut self, task: &str, terminal: TaskState) -> Vec<TaskId> {
        self.state.set(task, terminal);
        let mut manager = StateManager::new(&self.graph, &mut self.state, self.run_id);
        manager.mark_downstream_skipped(task)
    }

    /// Returns `true` the first time every task is terminal.
    fn maybe_finish_run(&mut self) -> bool {
        if self.finished {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.state, self.run_id);
        if manager.all_tasks_terminal() {
            info!(run_id = self.run_id, "scheduler: all tasks terminal; run finished");
            self.finished = true;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LoadError, LoadOperation, StoreError, TaskError};
    use crate::task::{RetryPolicy, Task};
    use std::time::Duration;

    fn store_failure() -> TaskOutcome {
        TaskOutcome::Failed(TaskError::Load(LoadError {
            table: "t".to_string(),
            operation: LoadOperation::Insert,
            source: StoreError::new("boom"),
        }))
    }

    fn chain(retry: RetryPolicy) -> Arc<DependencyGraph> {
        Arc::new(
            DependencyGraph::builder()
                .add_task(Task::marker("A").with_retry(retry))
                .add_task(Task::marker("B").after("A"))
                .add_task(Task::marker("C").after("B"))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn retry_cycle_goes_failed_then_pending_then_running() {
        let mut s = Scheduler::new(chain(RetryPolicy::fixed(2, Duration::from_millis(5))), 1);
        let step = s.start();
        assert_eq!(step.newly_scheduled.len(), 1);
        assert_eq!(step.newly_scheduled[0].attempt, 1);

        let step = s.handle_completion("A", 1, store_failure());
        assert_eq!(step.retries.len(), 1);
        assert_eq!(step.retries[0].delay, Duration::from_millis(5));
        assert_eq!(s.state_of("A"), Some(TaskState::Failed));
        assert!(!s.is_finished(), "a task awaiting retry is not terminal");

        let step = s.handle_retry_due("A");
        assert_eq!(step.newly_scheduled[0].id, "A");
        assert_eq!(step.newly_scheduled[0].attempt, 2);

        let step = s.handle_completion("A", 2, store_failure());
        assert!(step.retries.is_empty());
        assert_eq!(s.state_of("A"), Some(TaskState::AttemptsExhausted));
        assert_eq!(step.newly_skipped.len(), 2);
        assert!(step.run_just_finished);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut s = Scheduler::new(chain(RetryPolicy::once()), 1);
        s.start();
        let step = s.handle_completion("B", 1, TaskOutcome::Success);
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(s.state_of("B"), Some(TaskState::Pending));
    }

    #[test]
    fn abort_abandons_pending_retries() {
        let mut s = Scheduler::new(chain(RetryPolicy::fixed(5, Duration::from_secs(60))), 9);
        s.start();
        s.handle_completion("A", 1, store_failure());

        let step = s.abort();
        assert_eq!(step.newly_failed, vec!["A".to_string()]);
        assert!(step.run_just_finished);

        let report = s.report();
        assert!(report.aborted);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(s.handle_retry_due("A").newly_scheduled.is_empty());
    }
}
