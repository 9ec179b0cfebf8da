// tests/runtime_fake_executor.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};

use assetpipe::dag::{DagGraph, Scheduler};
use assetpipe::engine::{
    CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TaskOutcome, TriggerReason,
    TriggerWhileRunningBehaviour,
};
use assetpipe_test_utils::fake_executor::FakeExecutor;

type TestResult = Result<(), Box<dyn Error>>;

const ALL_STAGES: [&str; 5] = ["templates", "styles", "scripts", "images", "fonts"];

fn one_shot() -> RuntimeOptions {
    RuntimeOptions {
        exit_when_idle: true,
        live_reload: false,
    }
}

fn core(options: RuntimeOptions) -> CoreRuntime {
    let scheduler = Scheduler::new(DagGraph::stages().unwrap());
    CoreRuntime::new(scheduler, TriggerWhileRunningBehaviour::Queue, 1, options)
}

fn build_all() -> RuntimeEvent {
    RuntimeEvent::TasksTriggered {
        tasks: ALL_STAGES.map(String::from).to_vec(),
        reason: TriggerReason::Manual,
    }
}

#[tokio::test]
async fn full_build_runs_templates_last() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    rt_tx.send(build_all()).await?;

    let runtime = Runtime::new(core(one_shot()), rt_rx, executor);
    let failed = with_timeout(runtime.run()).await?;

    assert!(failed.is_empty());
    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(tasks_run, vec!["fonts", "images", "scripts", "styles", "templates"]);

    Ok(())
}

#[tokio::test]
async fn failed_style_stage_skips_templates_and_is_returned() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone())
        .with_outcome("styles", TaskOutcome::Failed);

    rt_tx.send(build_all()).await?;

    let runtime = Runtime::new(core(one_shot()), rt_rx, executor);
    let failed = with_timeout(runtime.run()).await?;

    assert_eq!(failed, vec!["styles".to_string(), "templates".to_string()]);
    let tasks_run = executed.lock().unwrap().clone();
    assert!(!tasks_run.contains(&"templates".to_string()));

    Ok(())
}

#[tokio::test]
async fn reported_errors_do_not_block_templates() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone())
        .with_outcome("scripts", TaskOutcome::Reported);

    rt_tx.send(build_all()).await?;

    let runtime = Runtime::new(core(one_shot()), rt_rx, executor);
    let failed = with_timeout(runtime.run()).await?;

    assert!(failed.is_empty());
    assert_eq!(executed.lock().unwrap().last().map(String::as_str), Some("templates"));

    Ok(())
}

#[tokio::test]
async fn trigger_during_run_is_queued_for_the_next_run() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(32);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    // The style trigger is read while the first run is in flight.
    rt_tx.send(build_all()).await?;
    rt_tx
        .send(RuntimeEvent::TaskTriggered {
            task: "styles".to_string(),
            reason: TriggerReason::FileWatch,
        })
        .await?;

    let runtime = Runtime::new(core(one_shot()), rt_rx, executor);
    with_timeout(runtime.run()).await?;

    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(
        tasks_run,
        vec!["fonts", "images", "scripts", "styles", "templates", "styles", "templates"]
    );

    Ok(())
}

#[tokio::test]
async fn every_finished_run_notifies_reload() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let (reload_tx, mut reload_rx) = broadcast::channel(4);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    rt_tx
        .send(RuntimeEvent::TaskTriggered {
            task: "fonts".to_string(),
            reason: TriggerReason::FileWatch,
        })
        .await?;

    let options = RuntimeOptions {
        exit_when_idle: true,
        live_reload: true,
    };
    let runtime = Runtime::new(core(options), rt_rx, executor).with_reload(reload_tx);
    with_timeout(runtime.run()).await?;

    assert_eq!(executed.lock().unwrap().clone(), vec!["fonts"]);
    assert!(reload_rx.try_recv().is_ok());

    Ok(())
}

#[tokio::test]
async fn shutdown_stops_before_any_stage_runs() -> TestResult {
    init_tracing();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), executed.clone());

    rt_tx.send(RuntimeEvent::ShutdownRequested).await?;
    rt_tx.send(build_all()).await?;

    let options = RuntimeOptions {
        exit_when_idle: false,
        live_reload: false,
    };
    let runtime = Runtime::new(core(options), rt_rx, executor);
    let failed = with_timeout(runtime.run()).await?;

    assert!(failed.is_empty());
    assert!(executed.lock().unwrap().is_empty());

    Ok(())
}
