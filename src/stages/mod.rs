// src/stages/mod.rs

//! Asset stages.
//!
//! Each stage turns the files of one [`AssetCategory`] into build output.
//! Stages are synchronous and side-effect only through the
//! [`FileSystem`] in their [`BuildContext`]; the executor runs them on the
//! blocking pool.
//!
//! - [`templates`] injects built asset references into HTML.
//! - [`styles`] compiles the SCSS entry point.
//! - [`scripts`] bundles the script entry point.
//! - [`images`] optimises images.
//! - [`fonts`] copies fonts.
//! - [`clean`] deletes the destination root (not a DAG stage).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use tracing::{error, info};

use crate::config::{ConfigFile, ImagesSection, ScriptsSection};
use crate::engine::TaskOutcome;
use crate::exec::StageRunner;
use crate::environment::Environment;
use crate::errors::StageError;
use crate::fs::{FileSystem, walk_files};
use crate::paths::{AssetCategory, PathConfig};

pub mod clean;
pub mod fonts;
pub mod images;
pub mod newer;
pub mod report;
pub mod scripts;
pub mod styles;
pub mod templates;

pub use report::{CollectingReporter, ConsoleReporter, ErrorReporter};

/// Everything a stage needs for one run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub paths: Arc<PathConfig>,
    pub env: Environment,
    pub browsers: Vec<String>,
    pub scripts: ScriptsSection,
    pub images: ImagesSection,
    pub fs: Arc<dyn FileSystem>,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl BuildContext {
    pub fn new(
        cfg: &ConfigFile,
        paths: Arc<PathConfig>,
        env: Environment,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            paths,
            env,
            browsers: cfg.build.browsers.clone(),
            scripts: cfg.scripts.clone(),
            images: cfg.images.clone(),
            fs,
            reporter: Arc::new(ConsoleReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Write `contents` and record the path in `report`.
    pub(crate) fn emit(
        &self,
        report: &mut StageReport,
        path: &Path,
        contents: &[u8],
    ) -> Result<(), StageError> {
        self.fs
            .write(path, contents)
            .map_err(|e| StageError::io(path, e))?;
        report.written.push(path.to_path_buf());
        Ok(())
    }
}

/// What a single stage run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub written: Vec<PathBuf>,
    pub skipped: usize,
    /// Errors handed to the reporter without aborting the run.
    pub reported: Vec<String>,
}

pub trait Stage: Send + Sync {
    fn category(&self) -> AssetCategory;
    fn run(&self, ctx: &BuildContext) -> Result<StageReport, StageError>;
}

/// How a stage failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    /// Reported; the run continues as if the stage succeeded.
    NonFatal,
    /// Propagated; dependents fail for this run.
    Fatal,
}

impl ErrorTier {
    pub fn for_stage(category: AssetCategory, env: Environment) -> Self {
        match category {
            AssetCategory::Templates | AssetCategory::Styles | AssetCategory::Scripts
                if env.is_production() =>
            {
                ErrorTier::NonFatal
            }
            _ => ErrorTier::Fatal,
        }
    }
}

/// The stage that builds `category`.
pub fn stage_for(category: AssetCategory) -> Box<dyn Stage> {
    match category {
        AssetCategory::Templates => Box::new(templates::TemplateStage),
        AssetCategory::Styles => Box::new(styles::StyleStage),
        AssetCategory::Scripts => Box::new(scripts::ScriptStage),
        AssetCategory::Images => Box::new(images::ImageStage),
        AssetCategory::Fonts => Box::new(fonts::FontStage),
    }
}

/// Run a stage and translate its result into a scheduler outcome,
/// applying the error tier of the stage.
pub fn run_stage(stage: &dyn Stage, ctx: &BuildContext) -> TaskOutcome {
    let category = stage.category();
    match stage.run(ctx) {
        Ok(report) => {
            info!(
                stage = %category,
                written = report.written.len(),
                skipped = report.skipped,
                reported = report.reported.len(),
                "stage finished"
            );
            if report.reported.is_empty() {
                TaskOutcome::Success
            } else {
                TaskOutcome::Reported
            }
        }
        Err(err) => match ErrorTier::for_stage(category, ctx.env) {
            ErrorTier::NonFatal => {
                ctx.reporter.report(category, &err);
                TaskOutcome::Reported
            }
            ErrorTier::Fatal => {
                error!(stage = %category, error = %err, "stage failed");
                TaskOutcome::Failed
            }
        },
    }
}

impl StageRunner for BuildContext {
    fn run(&self, task: &str) -> TaskOutcome {
        match task.parse::<AssetCategory>() {
            Ok(category) => run_stage(stage_for(category).as_ref(), self),
            Err(err) => {
                error!(task = %task, error = %err, "no stage for task");
                TaskOutcome::Failed
            }
        }
    }
}

/// Source files of a category, sorted.
pub fn collect_inputs(ctx: &BuildContext, category: AssetCategory) -> Result<Vec<PathBuf>, StageError> {
    let root = ctx.paths.source_root();
    let pattern = &ctx.paths.category(category).pattern;
    let matcher = compile_glob(pattern).map_err(|e| StageError::transform(root, e))?;

    let files = walk_files(ctx.fs.as_ref(), root).map_err(|e| StageError::io(root, e))?;
    Ok(files
        .into_iter()
        .filter(|path| {
            path.strip_prefix(root)
                .map(|rel| matcher.is_match(rel))
                .unwrap_or(false)
        })
        .collect())
}

/// Compile a glob where `*` does not cross directory separators.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// Read the entry file of `category`, or fail with [`StageError::MissingEntry`].
pub(crate) fn read_entry(ctx: &BuildContext, category: AssetCategory) -> Result<(PathBuf, String), StageError> {
    let entry = ctx
        .paths
        .category(category)
        .entry
        .clone()
        .ok_or_else(|| StageError::transform(ctx.paths.source_root(), format!("{category} has no entry file")))?;
    if !ctx.fs.is_file(&entry) {
        return Err(StageError::MissingEntry(entry));
    }
    let contents = ctx
        .fs
        .read_to_string(&entry)
        .map_err(|e| StageError::io(&entry, e))?;
    Ok((entry, contents))
}
