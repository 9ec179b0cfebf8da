//! Font stage: skip-if-newer verbatim copy.

use tracing::debug;

use crate::errors::StageError;
use crate::paths::AssetCategory;
use crate::stages::newer::is_stale;
use crate::stages::{BuildContext, Stage, StageReport, collect_inputs};

#[derive(Debug, Clone, Copy, Default)]
pub struct FontStage;

impl Stage for FontStage {
    fn category(&self) -> AssetCategory {
        AssetCategory::Fonts
    }

    fn run(&self, ctx: &BuildContext) -> Result<StageReport, StageError> {
        let mut report = StageReport::default();

        for source in collect_inputs(ctx, AssetCategory::Fonts)? {
            let Some(output) = ctx.paths.output_for(AssetCategory::Fonts, &source) else {
                continue;
            };
            if !is_stale(ctx.fs.as_ref(), &source, &output) {
                debug!(path = ?source, "font up to date");
                report.skipped += 1;
                continue;
            }
            let bytes = ctx.fs.read(&source).map_err(|e| StageError::io(&source, e))?;
            ctx.emit(&mut report, &output, &bytes)?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::*;
    use crate::config::ConfigFile;
    use crate::environment::Environment;
    use crate::fs::FileSystem;
    use crate::fs::mock::MockFileSystem;
    use crate::paths::PathConfig;

    #[test]
    fn copies_once_then_skips() {
        let fs = MockFileSystem::new();
        fs.add_file("src/fonts/sub/a.woff2", vec![1u8, 2, 3]);
        let ctx = BuildContext::new(
            &ConfigFile::default(),
            Arc::new(PathConfig::default()),
            Environment::Development,
            Arc::new(fs.clone()),
        );

        let first = FontStage.run(&ctx).unwrap();
        assert_eq!(first.written, vec![PathBuf::from("dist/fonts/sub/a.woff2")]);
        assert_eq!(fs.read(Path::new("dist/fonts/sub/a.woff2")).unwrap(), vec![1u8, 2, 3]);

        let second = FontStage.run(&ctx).unwrap();
        assert!(second.written.is_empty());
        assert_eq!(second.skipped, 1);
    }
}
