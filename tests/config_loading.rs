// tests/config_loading.rs

mod common;
use crate::common::builders::ConfigFileBuilder;
use crate::common::init_tracing;

use std::fs;
use std::path::{Path, PathBuf};

use assetpipe::config::{ConfigFile, load_and_validate, load_raw_or_default};
use assetpipe::environment::Environment;
use assetpipe::errors::PipelineError;
use assetpipe::types::{HashStorageMode, TriggerWhileRunningBehaviour};
use tempfile::TempDir;

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Assetpipe.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

fn config_error(contents: &str) -> String {
    let (_dir, path) = write_config(contents);
    match load_and_validate(&path) {
        Err(PipelineError::ConfigError(msg)) => msg,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn full_config_file_is_read() {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
[config]
triggered_while_running_behaviour = "cancel"
queue_length = 2

[paths]
source = "web"
destination = "public"

[build]
environment = "production"
browsers = ["defaults"]

[scripts]
target = "es2019"
cherry_pick = []

[scripts.provide]
"$" = "cash-dom"

[images]
jpeg_quality = 75

[server]
port = 4000

[watch]
use_hash = true
hash_storage = "file"
exclude = ["**/*.tmp"]
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.config.triggered_while_running_behaviour, TriggerWhileRunningBehaviour::Cancel);
    assert_eq!(cfg.config.queue_length, 2);
    assert_eq!(cfg.paths.source, PathBuf::from("web"));
    assert_eq!(cfg.build.environment, Some(Environment::Production));
    assert_eq!(cfg.scripts.target, "es2019");
    assert_eq!(cfg.scripts.provide.get("$").map(String::as_str), Some("cash-dom"));
    assert!(cfg.scripts.cherry_pick.is_empty());
    assert_eq!(cfg.images.jpeg_quality, 75);
    assert_eq!(cfg.server.port, 4000);
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert!(cfg.watch.use_hash);
    assert_eq!(cfg.watch.hash_storage, HashStorageMode::File);
}

#[test]
fn empty_file_means_defaults() {
    let (_dir, path) = write_config("");
    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.paths.source, PathBuf::from("src"));
    assert_eq!(cfg.paths.destination, PathBuf::from("dist"));
    assert_eq!(cfg.server.port, 3010);
    assert_eq!(cfg.images.jpeg_quality, 90);
    assert_eq!(cfg.scripts.target, "es2020");
    assert!(cfg.scripts.provide.contains_key("jQuery"));
}

#[test]
fn zero_queue_length_is_rejected() {
    let msg = config_error("[config]\nqueue_length = 0\n");
    assert!(msg.contains("queue_length"));
}

#[test]
fn out_of_range_jpeg_quality_is_rejected() {
    let msg = config_error("[images]\njpeg_quality = 0\n");
    assert!(msg.contains("jpeg_quality"));
    let msg = config_error("[images]\njpeg_quality = 101\n");
    assert!(msg.contains("101"));
}

#[test]
fn port_zero_is_rejected() {
    let msg = config_error("[server]\nport = 0\n");
    assert!(msg.contains("port"));
}

#[test]
fn destination_holding_sources_is_rejected() {
    let msg = config_error("[paths]\nsource = \"public/src\"\ndestination = \"public\"\n");
    assert!(msg.contains("clean would delete sources"));

    let msg = config_error("[paths]\nsource = \"src\"\ndestination = \"./src\"\n");
    assert!(msg.contains("both"));
}

#[test]
fn working_directory_as_destination_is_rejected() {
    let cwd = std::env::current_dir().unwrap();
    let toml = format!(
        "[paths]\nsource = \"src\"\ndestination = {:?}\n",
        cwd.to_string_lossy()
    );
    let msg = config_error(&toml);
    assert!(msg.contains("clean would delete sources"));
}

#[test]
fn invalid_exclude_glob_is_rejected() {
    let msg = config_error("[watch]\nexclude = [\"a/[b\"]\n");
    assert!(msg.contains("exclude"));
}

#[test]
fn unknown_sections_fail_to_parse() {
    let (_dir, path) = write_config("[task.build]\ncmd = \"make\"\n");
    assert!(matches!(load_and_validate(&path), Err(PipelineError::TomlError(_))));
}

#[test]
fn explicit_missing_path_is_an_io_error() {
    let missing = Path::new("/definitely/not/here/Assetpipe.toml");
    assert!(matches!(load_raw_or_default(Some(missing)), Err(PipelineError::IoError(_))));
}

#[test]
fn builder_output_passes_validation() {
    let raw = ConfigFileBuilder::new()
        .with_paths("assets", "build")
        .with_behaviour(TriggerWhileRunningBehaviour::Cancel, 3)
        .with_jpeg_quality(60)
        .with_exclude("**/*.swp")
        .raw();
    let cfg = ConfigFile::try_from(raw).unwrap();
    assert_eq!(cfg.paths.destination, PathBuf::from("build"));
    assert_eq!(cfg.images.jpeg_quality, 60);
    assert_eq!(cfg.watch.exclude, vec!["**/*.swp".to_string()]);
}
