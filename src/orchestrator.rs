// src/orchestrator.rs

//! What a command line asks for, and the lifecycle it goes through.

use std::fmt;

use tracing::info;

use crate::cli::Task;
use crate::paths::AssetCategory;

/// Lifecycle of one invocation. Every transition is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Cleaning,
    Building,
    /// Serving and/or watching until interrupted.
    Live,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Cleaning => "cleaning",
            OrchestratorState::Building => "building",
            OrchestratorState::Live => "live",
        })
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    state: OrchestratorState,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self {
            state: OrchestratorState::Idle,
        }
    }
}

impl Orchestrator {
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn transition(&mut self, next: OrchestratorState) {
        info!(from = %self.state, to = %next, "orchestrator state change");
        self.state = next;
    }
}

/// The work requested by a list of tasks, normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub clean: bool,
    /// Stages to build up front, in category order.
    pub stages: Vec<AssetCategory>,
    pub serve: bool,
    pub watch: bool,
}

impl Plan {
    /// No tasks means `default`.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let tasks: &[Task] = if tasks.is_empty() { &[Task::Default] } else { tasks };

        let mut plan = Plan {
            clean: false,
            stages: Vec::new(),
            serve: false,
            watch: false,
        };
        fn add(plan: &mut Plan, category: AssetCategory) {
            if !plan.stages.contains(&category) {
                plan.stages.push(category);
            }
        }

        for task in tasks {
            match task {
                Task::Default => {
                    plan.clean = true;
                    plan.serve = true;
                    plan.watch = true;
                    AssetCategory::ALL.into_iter().for_each(|c| add(&mut plan, c));
                }
                Task::Build => AssetCategory::ALL.into_iter().for_each(|c| add(&mut plan, c)),
                Task::Templates => add(&mut plan, AssetCategory::Templates),
                Task::Styles => add(&mut plan, AssetCategory::Styles),
                Task::Scripts => add(&mut plan, AssetCategory::Scripts),
                Task::Images => add(&mut plan, AssetCategory::Images),
                Task::Fonts => add(&mut plan, AssetCategory::Fonts),
                Task::Watch => plan.watch = true,
                Task::Serve => plan.serve = true,
                Task::Clean => plan.clean = true,
            }
        }
        plan.stages.sort();
        plan
    }

    /// Keeps running until interrupted.
    pub fn is_long_running(&self) -> bool {
        self.serve || self.watch
    }

    /// Stages the scheduler knows about: the requested ones, or all of them
    /// when only watching.
    pub fn scheduled_stages(&self) -> Vec<AssetCategory> {
        if self.stages.is_empty() && self.watch {
            AssetCategory::ALL.to_vec()
        } else {
            self.stages.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tasks_means_default() {
        let plan = Plan::from_tasks(&[]);
        assert!(plan.clean && plan.serve && plan.watch);
        assert_eq!(plan.stages.len(), 5);
        assert_eq!(plan, Plan::from_tasks(&[Task::Default]));
    }

    #[test]
    fn named_stages_are_deduplicated_and_ordered() {
        let plan = Plan::from_tasks(&[Task::Scripts, Task::Templates, Task::Scripts]);
        assert_eq!(plan.stages, vec![AssetCategory::Templates, AssetCategory::Scripts]);
        assert!(!plan.is_long_running());
        assert!(!plan.clean);
    }

    #[test]
    fn watch_alone_schedules_every_stage_without_building() {
        let plan = Plan::from_tasks(&[Task::Watch]);
        assert!(plan.stages.is_empty());
        assert_eq!(plan.scheduled_stages().len(), 5);
        assert!(plan.is_long_running());
    }

    #[test]
    fn transitions_are_tracked() {
        let mut orchestrator = Orchestrator::default();
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        orchestrator.transition(OrchestratorState::Cleaning);
        orchestrator.transition(OrchestratorState::Building);
        assert_eq!(orchestrator.state(), OrchestratorState::Building);
    }
}
