// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::RawConfigFile;
use crate::environment::Environment;

/// Command-line arguments for `assetpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetpipe",
    version,
    about = "Build front-end assets and serve them with live reload.",
    long_about = None
)]
pub struct CliArgs {
    /// Tasks to run. Without any, runs `default` (clean, build, serve and watch).
    #[arg(value_enum, value_name = "TASK")]
    pub tasks: Vec<Task>,

    /// Build environment. Falls back to `ASSETPIPE_ENV`, then the config file.
    #[arg(long, value_enum, value_name = "ENV")]
    pub env: Option<Environment>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Assetpipe.toml` in the current directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override `[paths].source`.
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Override `[paths].destination`.
    #[arg(long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Override `[server].port`.
    #[arg(long, value_name = "N")]
    pub port: Option<u16>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETPIPE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve configuration and print the plan without running anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Apply flag overrides to a freshly loaded config, before validation.
    pub fn apply_overrides(&self, raw: &mut RawConfigFile) {
        if let Some(source) = &self.source {
            raw.paths.source = source.clone();
        }
        if let Some(dest) = &self.dest {
            raw.paths.destination = dest.clone();
        }
        if let Some(port) = self.port {
            raw.server.port = port;
        }
    }
}

/// A named entry point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Task {
    /// Clean, build, then serve and watch.
    Default,
    Templates,
    Styles,
    Scripts,
    Images,
    Fonts,
    /// All five stages.
    Build,
    Watch,
    Serve,
    Clean,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
