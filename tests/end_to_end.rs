// tests/end_to_end.rs

mod common;
use crate::common::{init_tracing, sample_project, with_timeout};

use std::error::Error;

use assetpipe::cli::CliArgs;
use assetpipe::errors::PipelineError;
use clap::Parser;

type TestResult = Result<(), Box<dyn Error>>;

fn args(project: &common::builders::SourceTree, extra: &[&str]) -> CliArgs {
    let config = project.root().join("Assetpipe.toml");
    let source = project.source();
    let dest = project.dest();

    let mut argv = vec![
        "assetpipe".to_string(),
        "--config".to_string(),
        config.to_string_lossy().into_owned(),
        "--source".to_string(),
        source.to_string_lossy().into_owned(),
        "--dest".to_string(),
        dest.to_string_lossy().into_owned(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_then_build_in_production() -> TestResult {
    init_tracing();
    let project = sample_project().file("Assetpipe.toml", "[images]\njpeg_quality = 80\n");
    project.write("dist/stale.txt", "left over");

    with_timeout(assetpipe::run(args(&project, &["clean", "build", "--env", "production"]))).await?;

    assert!(!project.exists("dist/stale.txt"));
    assert!(project.exists("dist/styles/styles.min.css"));
    assert!(project.exists("dist/scripts/scripts.min.js"));
    assert!(project.exists("dist/img/dot.svg"));
    assert!(project.exists("dist/fonts/body.woff2"));
    let html = project.read_to_string("dist/index.html");
    assert!(html.contains("/styles/styles.min.css"));
    assert!(html.contains("/scripts/scripts.min.js"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn single_stage_runs_alone() -> TestResult {
    init_tracing();
    let project = sample_project().file("Assetpipe.toml", "");

    with_timeout(assetpipe::run(args(&project, &["fonts", "--env", "development"]))).await?;

    assert!(project.exists("dist/fonts/body.woff2"));
    assert!(!project.exists("dist/index.html"));
    assert!(!project.exists("dist/styles"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_stage_failure_fails_the_invocation() {
    init_tracing();
    let project = sample_project().file("Assetpipe.toml", "");
    project.write("src/scripts/scripts.js", "let = ;\n");

    let err = with_timeout(assetpipe::run(args(&project, &["build", "--env", "development"])))
        .await
        .unwrap_err();

    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::StageFailed(failed)) => {
            assert_eq!(failed, &vec!["scripts".to_string(), "templates".to_string()]);
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
    // Independent stages still ran.
    assert!(project.exists("dist/styles/styles.css"));
    assert!(!project.exists("dist/index.html"));
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_config_is_rejected_before_building() {
    init_tracing();
    let project = sample_project().file("Assetpipe.toml", "[server]\nport = 0\n");

    let err = with_timeout(assetpipe::run(args(&project, &["build"]))).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::ConfigError(_))));
    assert!(!project.exists("dist"));
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_touches_nothing() -> TestResult {
    init_tracing();
    let project = sample_project().file("Assetpipe.toml", "");
    project.write("dist/keep.txt", "still here");

    with_timeout(assetpipe::run(args(&project, &["--dry-run"]))).await?;

    assert_eq!(project.read_to_string("dist/keep.txt"), "still here");
    assert!(!project.exists("dist/index.html"));

    Ok(())
}
