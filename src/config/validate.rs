use std::path::{Path, PathBuf};

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};
use crate::paths::normalize;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_paths(cfg)?;
    validate_build(cfg)?;
    validate_images(cfg)?;
    validate_server(cfg)?;
    validate_watch(cfg)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.queue_length == 0 {
        return Err(PipelineError::ConfigError(
            "[config].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// `clean` deletes the destination root, so it must never contain the sources.
///
/// Both roots are compared as absolute paths, so a relative source next to
/// an absolute destination is checked too.
fn validate_paths(cfg: &RawConfigFile) -> Result<()> {
    if normalize(&cfg.paths.destination).as_os_str().is_empty() {
        return Err(PipelineError::ConfigError(
            "[paths].destination must not be the project root".to_string(),
        ));
    }

    let source = absolute(&cfg.paths.source, "source")?;
    let dest = absolute(&cfg.paths.destination, "destination")?;

    if source == dest {
        return Err(PipelineError::ConfigError(format!(
            "[paths].source and [paths].destination are both {:?}",
            cfg.paths.source
        )));
    }
    if source.starts_with(&dest) {
        return Err(PipelineError::ConfigError(format!(
            "[paths].destination {:?} contains the source root {:?}; clean would delete sources",
            cfg.paths.destination, cfg.paths.source
        )));
    }
    Ok(())
}

/// `path` resolved against the current directory, without touching the
/// filesystem.
fn absolute(path: &Path, key: &str) -> Result<PathBuf> {
    let resolved = std::path::absolute(path).map_err(|e| {
        PipelineError::ConfigError(format!("[paths].{key} {path:?} cannot be resolved: {e}"))
    })?;
    Ok(normalize(&resolved))
}

fn validate_build(cfg: &RawConfigFile) -> Result<()> {
    if cfg.build.browsers.iter().all(|q| q.trim().is_empty()) {
        return Err(PipelineError::ConfigError(
            "[build].browsers must contain at least one query".to_string(),
        ));
    }
    Ok(())
}

fn validate_images(cfg: &RawConfigFile) -> Result<()> {
    let q = cfg.images.jpeg_quality;
    if !(1..=100).contains(&q) {
        return Err(PipelineError::ConfigError(format!(
            "[images].jpeg_quality must be within 1..=100 (got {q})"
        )));
    }
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.port == 0 {
        return Err(PipelineError::ConfigError(
            "[server].port must not be 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    for pattern in &cfg.watch.exclude {
        Glob::new(pattern).map_err(|e| {
            PipelineError::ConfigError(format!("[watch].exclude has invalid glob {pattern:?}: {e}"))
        })?;
    }
    Ok(())
}
