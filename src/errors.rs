// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Stage(s) failed: {}", .0.join(", "))]
    StageFailed(Vec<String>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of a single transformation inside a stage.
///
/// Carries the file being processed so reporters can point at it.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{path}: {message}")]
    Transform { path: PathBuf, message: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("missing entry file {0}")]
    MissingEntry(PathBuf),
}

impl StageError {
    pub fn transform(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        StageError::Transform {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        StageError::Io {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
