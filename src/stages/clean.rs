//! Destination cleanup.

use tracing::info;

use crate::errors::StageError;
use crate::stages::BuildContext;

/// Delete the destination root. A missing root is fine.
pub fn clean(ctx: &BuildContext) -> Result<(), StageError> {
    let dest = ctx.paths.dest_root();
    ctx.fs
        .remove_dir_all(dest)
        .map_err(|e| StageError::io(dest, e))?;
    info!(path = ?dest, "cleaned destination");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::config::ConfigFile;
    use crate::environment::Environment;
    use crate::fs::FileSystem;
    use crate::fs::mock::MockFileSystem;
    use crate::paths::PathConfig;

    #[test]
    fn removes_destination_and_keeps_sources() {
        let fs = MockFileSystem::new();
        fs.add_file("src/index.html", "<p></p>");
        fs.add_file("dist/index.html", "<p></p>");
        let ctx = BuildContext::new(
            &ConfigFile::default(),
            Arc::new(PathConfig::default()),
            Environment::Development,
            Arc::new(fs.clone()),
        );

        clean(&ctx).unwrap();
        assert!(!fs.exists(Path::new("dist/index.html")));
        assert!(fs.exists(Path::new("src/index.html")));
        // Second clean on a missing root.
        clean(&ctx).unwrap();
    }
}
