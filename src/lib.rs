// src/lib.rs

pub mod bundler;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod environment;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod orchestrator;
pub mod paths;
pub mod pipeline;
pub mod server;
pub mod stages;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_raw_or_default};
use crate::dag::{DagGraph, Scheduler};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TriggerReason};
use crate::environment::Environment;
use crate::errors::PipelineError;
use crate::exec::StageExecutorBackend;
use crate::fs::{FileSystem, RealFileSystem};
use crate::orchestrator::{Orchestrator, OrchestratorState, Plan};
use crate::paths::{AssetCategory, PathConfig};
use crate::stages::BuildContext;
use crate::watch::watcher::WatchOptions;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and command-line overrides
/// - clean
/// - scheduler / queue / runtime and the stage executor
/// - the dev server and file watcher (when requested)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut raw = load_raw_or_default(args.config.as_deref())?;
    args.apply_overrides(&mut raw);
    let cfg = ConfigFile::try_from(raw)?;

    let env = Environment::current(args.env, cfg.build.environment);
    let paths = Arc::new(PathConfig::resolve(&cfg.paths.source, &cfg.paths.destination));
    let plan = Plan::from_tasks(&args.tasks);
    let graph = stage_graph(&plan)?;

    if args.dry_run {
        print_dry_run(env, &paths, &plan, &graph)?;
        return Ok(());
    }

    info!(environment = %env, ?plan, "starting");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let ctx = BuildContext::new(&cfg, paths.clone(), env, fs.clone());
    let mut orchestrator = Orchestrator::default();

    if plan.clean {
        orchestrator.transition(OrchestratorState::Cleaning);
        stages::clean::clean(&ctx)?;
    }

    if graph.tasks().next().is_none() && !plan.is_long_running() {
        orchestrator.transition(OrchestratorState::Idle);
        return Ok(());
    }

    // Bind before building so a busy port fails the invocation early.
    let listener = if plan.serve {
        Some(server::bind(&cfg.server).await?)
    } else {
        None
    };

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = StageExecutorBackend::new(rt_tx.clone(), Arc::new(ctx));

    let options = RuntimeOptions {
        exit_when_idle: !plan.is_long_running(),
        live_reload: plan.serve,
    };
    let core = CoreRuntime::new(
        Scheduler::new(graph.clone()),
        cfg.config.triggered_while_running_behaviour,
        cfg.config.queue_length,
        options,
    );
    let mut runtime = Runtime::new(core, rt_rx, executor);

    if let Some(listener) = listener {
        let reload = server::reload_channel();
        runtime = runtime.with_reload(reload.clone());
        let root = paths.dest_root().to_path_buf();
        tokio::spawn(async move {
            if let Err(err) = server::serve(listener, root, reload, shutdown_signal()).await {
                error!(error = %err, "dev server failed");
            }
        });
    }

    let _watcher_handle = if plan.watch {
        let profiles = watch::build_watch_profiles(&paths, &cfg.watch)?
            .into_iter()
            .filter(|p| graph.contains(p.name()))
            .collect();
        let options = WatchOptions {
            source_root: paths.source_root().to_path_buf(),
            state_root: config_root_dir(args.config.as_deref()),
            profiles,
            graph: graph.clone(),
            hash_storage: cfg.watch.hash_storage,
            fs: fs.clone(),
        };
        match watch::spawn_watcher(options, rt_tx.clone()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(error = %err, "file watcher unavailable; continuing without it");
                None
            }
        }
    } else {
        None
    };

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    if !plan.stages.is_empty() {
        orchestrator.transition(OrchestratorState::Building);
        let tasks: Vec<String> = plan.stages.iter().map(|c| c.name().to_string()).collect();
        rt_tx
            .send(RuntimeEvent::TasksTriggered {
                tasks,
                reason: TriggerReason::Manual,
            })
            .await?;
    }
    if plan.is_long_running() {
        orchestrator.transition(OrchestratorState::Live);
    }

    let failed = runtime.run().await?;
    orchestrator.transition(OrchestratorState::Idle);

    if !failed.is_empty() && !plan.is_long_running() {
        return Err(PipelineError::StageFailed(failed).into());
    }
    Ok(())
}

/// The stage graph for this plan.
///
/// Stages that were not requested are left out entirely, so a single named
/// stage neither pulls in nor waits for its upstream stages.
fn stage_graph(plan: &Plan) -> crate::errors::Result<DagGraph> {
    let graph = DagGraph::stages()?;
    let scheduled = plan.scheduled_stages();
    if scheduled.len() == AssetCategory::ALL.len() {
        return Ok(graph);
    }
    let names: Vec<&str> = scheduled.iter().map(|c| c.name()).collect();
    graph.restricted_to(&names)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Directory that holds `.assetpipe/`: next to an explicit config file,
/// otherwise the current directory.
fn config_root_dir(config_path: Option<&Path>) -> PathBuf {
    match config_path.and_then(Path::parent) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Print the resolved environment, paths and stage order.
fn print_dry_run(env: Environment, paths: &PathConfig, plan: &Plan, graph: &DagGraph) -> crate::errors::Result<()> {
    println!("assetpipe dry-run");
    println!("  environment = {env}");
    println!("  source = {}", paths.source_root().display());
    println!("  destination = {}", paths.dest_root().display());
    println!(
        "  clean = {}, serve = {}, watch = {}",
        plan.clean, plan.serve, plan.watch
    );
    println!();

    let order = graph.topological_order()?;
    println!("stages ({}):", order.len());
    for name in &order {
        let category: AssetCategory = name.parse().map_err(PipelineError::TaskNotFound)?;
        let layout = paths.category(category);
        println!("  - {name}");
        if let Some(entry) = &layout.entry {
            println!("      entry: {}", entry.display());
        }
        println!("      pattern: {}", layout.pattern);
        println!("      dest: {}", layout.dest.display());
        let deps = graph.dependencies_of(name);
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
        if !plan.stages.contains(&category) {
            println!("      (watch only)");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
