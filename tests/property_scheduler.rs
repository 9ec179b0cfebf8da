// tests/property_scheduler.rs

use proptest::prelude::*;

use assetpipe::dag::{DagGraph, Scheduler, TaskRunState};
use assetpipe::engine::TaskOutcome;

const STAGES: [&str; 5] = ["fonts", "images", "scripts", "styles", "templates"];

fn outcome_strategy() -> impl Strategy<Value = TaskOutcome> {
    prop_oneof![
        Just(TaskOutcome::Success),
        Just(TaskOutcome::Reported),
        Just(TaskOutcome::Failed),
    ]
}

proptest! {
    /// Whatever gets triggered and in whatever order stages finish,
    /// templates are only dispatched once styles and scripts are done,
    /// and every run terminates.
    #[test]
    fn templates_wait_for_styles_and_scripts(
        triggers in proptest::sample::subsequence(STAGES.to_vec(), 1..=5),
        outcomes in proptest::collection::vec(outcome_strategy(), 5),
        picks in proptest::collection::vec(any::<usize>(), 16),
    ) {
        let mut scheduler = Scheduler::new(DagGraph::stages().unwrap());
        scheduler.start_new_run();

        let mut executing: Vec<String> = scheduler
            .handle_triggers(&triggers)
            .into_iter()
            .map(|t| t.name)
            .collect();
        let mut dispatched: Vec<String> = executing.clone();
        if dispatched.iter().any(|d| d == "templates") {
            prop_assert!(!triggers.contains(&"styles") && !triggers.contains(&"scripts"));
        }

        let mut steps = 0;
        while !executing.is_empty() {
            prop_assert!(steps < 16, "run did not terminate");
            let idx = picks[steps] % executing.len();
            let task = executing.remove(idx);
            let outcome = outcomes[STAGES.iter().position(|s| *s == task).unwrap()];

            for next in scheduler.handle_completion(&task, outcome) {
                if next.name == "templates" {
                    for upstream in ["styles", "scripts"] {
                        let state = scheduler.run_state_of(upstream).unwrap();
                        prop_assert!(
                            matches!(state, TaskRunState::DoneSuccess | TaskRunState::NotInRun),
                            "templates dispatched while {upstream} was {state:?}"
                        );
                    }
                }
                dispatched.push(next.name.clone());
                executing.push(next.name);
            }
            steps += 1;
        }

        prop_assert!(scheduler.is_idle());

        // Every stage is dispatched at most once per run.
        let mut unique = dispatched.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), dispatched.len());

        // Templates always take part when an upstream stage was triggered,
        // and run exactly when nothing upstream failed.
        let upstream_failed = ["styles", "scripts"].iter().any(|s| {
            dispatched.iter().any(|d| d == s)
                && outcomes[STAGES.iter().position(|x| x == s).unwrap()] == TaskOutcome::Failed
        });
        let involved = triggers.iter().any(|t| matches!(*t, "styles" | "scripts" | "templates"));
        prop_assert_eq!(
            dispatched.iter().any(|d| d == "templates"),
            involved && !upstream_failed
        );
    }
}
