// src/dag/scheduler.rs

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::run::{RunTable, ScheduledTask, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};

/// What one scheduler step changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Stages that became ready and must be dispatched now.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Stages failed by this step: the stage itself, then blocked dependents.
    pub newly_failed: Vec<TaskName>,
    /// The run ended with this step; the scheduler is idle again.
    pub run_just_finished: bool,
}

/// Holds the stage graph plus the state of the current run.
///
/// Decides when a triggered stage is ready (dependencies done) and fails
/// dependents of a failed stage for the rest of the run.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    table: RunTable,
    /// Id handed to the most recently started run.
    last_run_id: u64,
    /// `None` when no run is active.
    current_run_id: Option<u64>,
}

impl Scheduler {
    pub fn new(graph: DagGraph) -> Self {
        let table = RunTable::new(&graph);
        Self {
            graph,
            table,
            last_run_id: 0,
            current_run_id: None,
        }
    }

    /// No run is active.
    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    pub fn current_run_id(&self) -> Option<u64> {
        self.current_run_id
    }

    /// State of `task` in the current run; `None` for unknown stages.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        self.table.state_of(task)
    }

    /// Stages participating in the active run, sorted. Empty when idle.
    pub fn tasks_in_current_run(&self) -> Vec<TaskName> {
        if self.is_idle() {
            return Vec::new();
        }
        self.table.participants()
    }

    /// Whether `task` could start now. `None` for unknown stages.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        self.table.deps_satisfied(task)
    }

    /// Start a new run with nobody participating yet.
    pub fn start_new_run(&mut self) {
        self.last_run_id += 1;
        self.current_run_id = Some(self.last_run_id);
        self.table.reset();
        debug!(run_id = self.last_run_id, "scheduler: starting new build run");
    }

    pub fn handle_trigger(&mut self, task: &str) -> Vec<ScheduledTask> {
        self.trigger(&[task]).newly_scheduled
    }

    /// Trigger several stages at once.
    ///
    /// All of them join the run before any is scheduled, so a stage never
    /// starts ahead of an upstream stage triggered in the same batch.
    pub fn handle_triggers<S: AsRef<str>>(&mut self, tasks: &[S]) -> Vec<ScheduledTask> {
        let tasks: Vec<&str> = tasks.iter().map(|t| t.as_ref()).collect();
        self.trigger(&tasks).newly_scheduled
    }

    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.complete(task, outcome).newly_scheduled
    }

    /// [`Scheduler::handle_completion`] with the full [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        self.complete(task, outcome)
    }

    fn trigger(&mut self, tasks: &[&str]) -> SchedulerStep {
        let run_id = match self.current_run_id {
            Some(id) => id,
            None => {
                warn!(?tasks, "trigger with no active run; implicitly starting a new run");
                self.start_new_run();
                self.last_run_id
            }
        };

        for task in tasks {
            if self.table.contains(task) {
                self.table.include(&self.graph, task);
            } else {
                warn!(task = %task, "trigger for unknown stage; ignoring");
            }
        }

        SchedulerStep {
            newly_scheduled: self.table.take_ready(run_id),
            newly_failed: Vec::new(),
            run_just_finished: self.finish_run_if_settled(),
        }
    }

    fn complete(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let Some(run_id) = self.current_run_id else {
            warn!(task = %task, "completion with no active run; ignoring");
            return SchedulerStep::default();
        };

        let succeeded = outcome != TaskOutcome::Failed;
        if !self.table.finish(task, succeeded) {
            warn!(task = %task, "completion for unknown stage; ignoring");
            return SchedulerStep::default();
        }

        let mut step = SchedulerStep::default();
        if succeeded {
            debug!(task = %task, run_id, ?outcome, "stage completed");
            step.newly_scheduled = self.table.take_ready(run_id);
        } else {
            warn!(task = %task, run_id, "stage failed; failing dependents in this run");
            step.newly_failed.push(task.to_string());
            let blocked = self.table.block_dependents(&self.graph, task);
            step.newly_failed.extend(blocked);
        }
        step.run_just_finished = self.finish_run_if_settled();
        step
    }

    /// End the active run once nothing is pending or running.
    fn finish_run_if_settled(&mut self) -> bool {
        if self.current_run_id.is_none() || !self.table.is_settled() {
            return false;
        }
        info!(run_id = self.current_run_id, "scheduler: all stages settled; run finished");
        self.current_run_id = None;
        true
    }
}
