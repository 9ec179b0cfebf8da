// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) reads events from channels,
//! sends `ScheduledTask`s to the executor and broadcasts reloads. The core
//! is unit tested without any Tokio, channels or filesystem.

use std::collections::BTreeSet;

use crate::dag::Scheduler;
use crate::engine::event_handlers::{handle_task_completion, handle_task_triggers, CoreStep};
use crate::engine::queue::TriggerQueue;
use crate::engine::{RuntimeEvent, RuntimeOptions, TaskName};
use crate::types::TriggerWhileRunningBehaviour;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: TriggerQueue,
    options: RuntimeOptions,
    /// Tasks that failed (or were failed by an upstream task) in the latest run.
    failed: BTreeSet<TaskName>,
}

impl CoreRuntime {
    pub fn new(
        scheduler: Scheduler,
        behaviour: TriggerWhileRunningBehaviour,
        queue_length: usize,
        options: RuntimeOptions,
    ) -> Self {
        let queue = TriggerQueue::new(behaviour, queue_length);
        Self {
            scheduler,
            queue,
            options,
            failed: BTreeSet::new(),
        }
    }

    /// Expose whether the scheduler is idle (for tests).
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Expose queue emptiness (for tests).
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Failed tasks of the latest run, sorted.
    pub fn failed_tasks(&self) -> Vec<TaskName> {
        self.failed.iter().cloned().collect()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskTriggered { task, reason } => handle_task_triggers(
                &mut self.scheduler,
                &mut self.queue,
                &mut self.failed,
                vec![task],
                reason,
            ),
            RuntimeEvent::TasksTriggered { tasks, reason } => handle_task_triggers(
                &mut self.scheduler,
                &mut self.queue,
                &mut self.failed,
                tasks,
                reason,
            ),
            RuntimeEvent::TaskCompleted { task, outcome } => handle_task_completion(
                &mut self.scheduler,
                &mut self.queue,
                &mut self.failed,
                &self.options,
                task,
                outcome,
            ),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{DagGraph, ScheduledTask};
    use crate::engine::{CoreCommand, TaskOutcome, TriggerReason};

    fn core(options: RuntimeOptions) -> CoreRuntime {
        let scheduler = Scheduler::new(DagGraph::stages().unwrap());
        CoreRuntime::new(scheduler, TriggerWhileRunningBehaviour::Queue, 1, options)
    }

    fn build_all() -> RuntimeEvent {
        RuntimeEvent::TasksTriggered {
            tasks: ["templates", "styles", "scripts", "images", "fonts"]
                .map(String::from)
                .to_vec(),
            reason: TriggerReason::Manual,
        }
    }

    fn complete(task: &str, outcome: TaskOutcome) -> RuntimeEvent {
        RuntimeEvent::TaskCompleted {
            task: task.to_string(),
            outcome,
        }
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .flat_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => tasks.iter().map(|t: &ScheduledTask| t.name.clone()).collect(),
                _ => Vec::new(),
            })
            .collect()
    }

    #[test]
    fn one_shot_build_exits_after_templates() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: true,
            live_reload: false,
        });

        let step = core.step(build_all());
        assert_eq!(dispatched(&step), vec!["fonts", "images", "scripts", "styles"]);

        core.step(complete("fonts", TaskOutcome::Success));
        core.step(complete("images", TaskOutcome::Success));
        core.step(complete("styles", TaskOutcome::Reported));
        let step = core.step(complete("scripts", TaskOutcome::Success));
        assert_eq!(dispatched(&step), vec!["templates"]);
        assert!(step.keep_running);

        let step = core.step(complete("templates", TaskOutcome::Success));
        assert!(!step.keep_running);
        assert_eq!(step.commands, vec![CoreCommand::RequestExit]);
        assert!(core.failed_tasks().is_empty());
    }

    #[test]
    fn failed_stage_is_remembered_with_its_dependents() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: true,
            live_reload: false,
        });
        core.step(build_all());
        for task in ["fonts", "images", "scripts"] {
            core.step(complete(task, TaskOutcome::Success));
        }
        let step = core.step(complete("styles", TaskOutcome::Failed));
        assert!(!step.keep_running);
        assert_eq!(core.failed_tasks(), vec!["styles", "templates"]);
    }

    #[test]
    fn finished_runs_request_a_reload_when_enabled() {
        let mut core = core(RuntimeOptions {
            exit_when_idle: false,
            live_reload: true,
        });
        core.step(RuntimeEvent::TaskTriggered {
            task: "images".to_string(),
            reason: TriggerReason::FileWatch,
        });
        let step = core.step(complete("images", TaskOutcome::Success));
        assert_eq!(step.commands, vec![CoreCommand::NotifyReload]);
        assert!(step.keep_running);
        assert!(core.is_idle());
    }

    #[test]
    fn retrigger_during_run_is_queued_for_the_next_run() {
        let mut core = core(RuntimeOptions::default());
        core.step(RuntimeEvent::TaskTriggered {
            task: "styles".to_string(),
            reason: TriggerReason::FileWatch,
        });
        let step = core.step(RuntimeEvent::TaskTriggered {
            task: "styles".to_string(),
            reason: TriggerReason::FileWatch,
        });
        assert!(dispatched(&step).is_empty());
        assert!(!core.queue_is_empty());

        core.step(complete("styles", TaskOutcome::Success));
        let step = core.step(complete("templates", TaskOutcome::Success));
        assert_eq!(dispatched(&step), vec!["styles"]);
        assert!(core.queue_is_empty());
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let mut core = core(RuntimeOptions::default());
        assert!(!core.step(RuntimeEvent::ShutdownRequested).keep_running);
    }
}
