//! Source/destination layout for every asset category.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Default source root.
pub const DEFAULT_SOURCE: &str = "src";
/// Default destination root.
pub const DEFAULT_DESTINATION: &str = "dist";

/// One asset category, which is also the name of the stage that builds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetCategory {
    Templates,
    Styles,
    Scripts,
    Images,
    Fonts,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 5] = [
        AssetCategory::Templates,
        AssetCategory::Styles,
        AssetCategory::Scripts,
        AssetCategory::Images,
        AssetCategory::Fonts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AssetCategory::Templates => "templates",
            AssetCategory::Styles => "styles",
            AssetCategory::Scripts => "scripts",
            AssetCategory::Images => "images",
            AssetCategory::Fonts => "fonts",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetCategory::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown asset category: {s}"))
    }
}

/// Where one category reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPaths {
    /// Glob relative to the source root, used for collecting inputs and watching.
    pub pattern: String,
    /// Single root file for categories that compile from an entry point.
    pub entry: Option<PathBuf>,
    pub dest: PathBuf,
}

/// Immutable mapping from category to paths, built once from two roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConfig {
    source_root: PathBuf,
    dest_root: PathBuf,
    templates: CategoryPaths,
    styles: CategoryPaths,
    scripts: CategoryPaths,
    images: CategoryPaths,
    fonts: CategoryPaths,
}

impl PathConfig {
    pub fn resolve(source_root: impl AsRef<Path>, dest_root: impl AsRef<Path>) -> Self {
        let source_root = source_root.as_ref().to_path_buf();
        let dest_root = dest_root.as_ref().to_path_buf();

        Self {
            templates: CategoryPaths {
                pattern: "*.html".to_string(),
                entry: None,
                dest: dest_root.clone(),
            },
            styles: CategoryPaths {
                pattern: "styles/**/*.{scss,css}".to_string(),
                entry: Some(source_root.join("styles.scss")),
                dest: dest_root.join("styles"),
            },
            scripts: CategoryPaths {
                pattern: "scripts/**/*.js".to_string(),
                entry: Some(source_root.join("scripts").join("scripts.js")),
                dest: dest_root.join("scripts"),
            },
            images: CategoryPaths {
                pattern: "img/**/*".to_string(),
                entry: None,
                dest: dest_root.join("img"),
            },
            fonts: CategoryPaths {
                pattern: "fonts/**/*".to_string(),
                entry: None,
                dest: dest_root.join("fonts"),
            },
            source_root,
            dest_root,
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    pub fn category(&self, category: AssetCategory) -> &CategoryPaths {
        match category {
            AssetCategory::Templates => &self.templates,
            AssetCategory::Styles => &self.styles,
            AssetCategory::Scripts => &self.scripts,
            AssetCategory::Images => &self.images,
            AssetCategory::Fonts => &self.fonts,
        }
    }

    /// Patterns to watch for a category, relative to the source root.
    ///
    /// The styles entry sits outside `styles/`, so it is added explicitly.
    pub fn watch_patterns(&self, category: AssetCategory) -> Vec<String> {
        let paths = self.category(category);
        let mut patterns = vec![paths.pattern.clone()];
        if let Some(entry) = &paths.entry {
            if let Ok(rel) = entry.strip_prefix(&self.source_root) {
                let rel = rel.to_string_lossy().replace('\\', "/");
                if !patterns.contains(&rel) {
                    patterns.push(rel);
                }
            }
        }
        patterns
    }

    /// Destination of a source file in a category that copies files one to
    /// one: the path below the pattern's literal directory prefix, placed
    /// under the category destination.
    pub fn output_for(&self, category: AssetCategory, source: &Path) -> Option<PathBuf> {
        let paths = self.category(category);
        let base = self.source_root.join(literal_prefix(&paths.pattern));
        let rel = source.strip_prefix(&base).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        Some(paths.dest.join(rel))
    }

    /// URL of a built file as injected into templates: destination root
    /// stripped, forward slashes, leading `/`.
    pub fn public_url(&self, built: &Path) -> Option<String> {
        let rel = built.strip_prefix(&self.dest_root).ok()?;
        Some(format!("/{}", rel.to_string_lossy().replace('\\', "/")))
    }
}

/// Lexically normalise a path: drop `.` components and resolve `..` where
/// possible. No filesystem access.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Leading directories of a glob that contain no glob syntax
/// (`img/**/*` → `img`).
fn literal_prefix(pattern: &str) -> PathBuf {
    pattern
        .split('/')
        .take_while(|segment| !segment.contains(['*', '?', '[', '{']))
        .collect()
}

impl Default for PathConfig {
    fn default() -> Self {
        Self::resolve(DEFAULT_SOURCE, DEFAULT_DESTINATION)
    }
}
