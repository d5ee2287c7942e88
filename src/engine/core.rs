// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - running retry timers and reacting to aborts
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, or warehouse.

use crate::dag::{RunReport, Scheduler};
use crate::engine::event_handlers::{
    handle_abort, handle_retry_due, handle_task_completion, start_run, CoreStep,
};
use crate::engine::RuntimeEvent;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    /// Expose whether the run is over (for tests).
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report(&self) -> RunReport {
        self.scheduler.report()
    }

    /// Dispatch the root tasks.
    pub fn start(&mut self) -> CoreStep {
        start_run(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted {
                task,
                attempt,
                outcome,
            } => handle_task_completion(&mut self.scheduler, task, attempt, outcome),
            RuntimeEvent::RetryDue { task } => handle_retry_due(&mut self.scheduler, task),
            RuntimeEvent::AbortRequested => handle_abort(&mut self.scheduler),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DependencyGraph;
    use crate::engine::{CoreCommand, TaskOutcome};
    use crate::task::Task;
    use std::sync::Arc;

    fn fan_out() -> CoreRuntime {
        let graph = DependencyGraph::builder()
            .add_task(Task::marker("root"))
            .add_task(Task::marker("left").after("root"))
            .add_task(Task::marker("right").after("root"))
            .build()
            .unwrap();
        CoreRuntime::new(Scheduler::new(Arc::new(graph), 1))
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter().map(|t| t.id.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn siblings_are_dispatched_together() {
        let mut core = fan_out();
        let step = core.start();
        assert_eq!(dispatched(&step), vec!["root"]);
        assert!(step.keep_running);

        let step = core.step(RuntimeEvent::TaskCompleted {
            task: "root".to_string(),
            attempt: 1,
            outcome: TaskOutcome::Success,
        });
        assert_eq!(dispatched(&step), vec!["left", "right"]);
    }

    #[test]
    fn finishing_emits_finish_and_stops() {
        let mut core = fan_out();
        core.start();
        for task in ["root", "left", "right"] {
            let step = core.step(RuntimeEvent::TaskCompleted {
                task: task.to_string(),
                attempt: 1,
                outcome: TaskOutcome::Success,
            });
            if task == "right" {
                assert!(!step.keep_running);
                assert_eq!(step.commands, vec![CoreCommand::Finish]);
            }
        }
        assert!(core.report().is_success());
    }
}
