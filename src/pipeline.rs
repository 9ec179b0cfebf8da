//! Composable transformation pipelines.
//!
//! A [`Pipeline`] is an ordered list of named steps, each a plain function
//! from `T` to `Result<T, StageError>`. Stages build one per run and hand it
//! an input value; the runner stops at the first error and returns it.

use std::fmt;
use std::path::PathBuf;

use tracing::trace;

use crate::errors::StageError;

/// A single transformation step.
pub type Step<T> = Box<dyn Fn(T) -> Result<T, StageError> + Send + Sync>;

pub struct Pipeline<T> {
    steps: Vec<(&'static str, Step<T>)>,
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.steps.iter().map(|(name, _)| *name).collect();
        f.debug_struct("Pipeline").field("steps", &names).finish()
    }
}

impl<T> Default for Pipeline<T> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<T> Pipeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then(mut self, name: &'static str, step: Step<T>) -> Self {
        self.steps.push((name, step));
        self
    }

    /// Append a step that only runs when `enabled` is true.
    ///
    /// Disabled steps are not recorded at all, so [`Pipeline::step_names`]
    /// reflects what will actually execute.
    pub fn then_if(self, enabled: bool, name: &'static str, step: Step<T>) -> Self {
        if enabled { self.then(name, step) } else { self }
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|(name, _)| *name).collect()
    }

    /// Feed `input` through every step in order.
    pub fn run(&self, input: T) -> Result<T, StageError> {
        let mut value = input;
        for (name, step) in &self.steps {
            trace!(step = name, "running pipeline step");
            value = step(value)?;
        }
        Ok(value)
    }
}

/// A file moving through a stage pipeline.
///
/// `output` is the destination path relative to the category's destination
/// directory; steps may rename it (e.g. adding a `.min` suffix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub source: PathBuf,
    pub output: PathBuf,
    pub contents: String,
    /// Source map JSON produced by an earlier step, if any.
    pub source_map: Option<String>,
}

impl Asset {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>, contents: String) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            contents,
            source_map: None,
        }
    }

    /// Insert `suffix` before the extension of the output name
    /// (`styles.css` → `styles.min.css`).
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        let stem = self
            .output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match self.output.extension() {
            Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
            None => format!("{stem}{suffix}"),
        };
        self.output.set_file_name(name);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_run_in_order() {
        let pipeline = Pipeline::<String>::new()
            .then("a", Box::new(|s| Ok(s + "a")))
            .then("b", Box::new(|s| Ok(s + "b")));
        assert_eq!(pipeline.run(String::new()).unwrap(), "ab");
    }

    #[test]
    fn first_error_stops_the_run() {
        let pipeline = Pipeline::<String>::new()
            .then("fail", Box::new(|_| Err(StageError::transform("x.scss", "boom"))))
            .then("never", Box::new(|_| panic!("must not run")));
        let err = pipeline.run(String::new()).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn disabled_steps_are_not_recorded() {
        let pipeline = Pipeline::<String>::new()
            .then_if(false, "minify", Box::new(|s| Ok(s)))
            .then("write", Box::new(|s| Ok(s)));
        assert_eq!(pipeline.step_names(), vec!["write"]);
    }

    #[test]
    fn suffix_goes_before_extension() {
        let asset = Asset::new("src/styles.scss", "styles.css", String::new()).with_suffix(".min");
        assert_eq!(asset.output, PathBuf::from("styles.min.css"));
    }
}
