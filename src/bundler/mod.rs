// src/bundler/mod.rs

//! Script bundling.
//!
//! Starting from the entry script, every transitively requested module is
//! rewritten ([`rewrite`]), resolved ([`resolve`]) and finally wrapped into
//! a single registry script ([`runtime`]). The result is plain ES2015+
//! syntax ready for transpiling and minifying.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::ScriptsSection;
use crate::errors::StageError;
use crate::fs::FileSystem;
use crate::paths::normalize;

pub mod resolve;
pub mod rewrite;
pub mod runtime;

use self::rewrite::{RequestKind, RewriteOptions, RewrittenModule};
use self::runtime::BundledModule;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").expect("identifier pattern"));

/// Output of [`Bundler::bundle`].
#[derive(Debug, Clone)]
pub struct Bundle {
    pub code: String,
    /// Bundled module paths, in id order.
    pub modules: Vec<PathBuf>,
}

pub struct Bundler<'a> {
    fs: &'a dyn FileSystem,
    options: &'a ScriptsSection,
}

#[derive(Default)]
struct ModuleGraph {
    ids: HashMap<PathBuf, usize>,
    modules: Vec<BundledModule>,
}

impl ModuleGraph {
    /// Id of `path`, registering it if new.
    fn id_of(&mut self, path: &Path) -> usize {
        if let Some(id) = self.ids.get(path) {
            return *id;
        }
        let id = self.modules.len();
        self.ids.insert(path.to_path_buf(), id);
        self.modules.push(BundledModule {
            path: path.to_path_buf(),
            code: String::new(),
            deps: BTreeMap::new(),
        });
        id
    }
}

impl<'a> Bundler<'a> {
    pub fn new(fs: &'a dyn FileSystem, options: &'a ScriptsSection) -> Self {
        Self { fs, options }
    }

    /// Bundle `entry`, whose contents are already loaded.
    pub fn bundle(&self, entry: &Path, entry_source: &str) -> Result<Bundle, StageError> {
        let mut graph = ModuleGraph::default();
        graph.id_of(&normalize(entry));

        let mut next = 0;
        while next < graph.modules.len() {
            let path = graph.modules[next].path.clone();
            let source = if next == 0 {
                entry_source.to_string()
            } else {
                self.fs
                    .read_to_string(&path)
                    .map_err(|e| StageError::io(&path, e))?
            };

            let (code, deps) = self.link_module(&mut graph, &path, &source)?;
            let module = &mut graph.modules[next];
            module.code = code;
            module.deps = deps;
            next += 1;
        }

        debug!(modules = graph.modules.len(), "bundled scripts");
        Ok(Bundle {
            code: runtime::assemble(&graph.modules),
            modules: graph.modules.iter().map(|m| m.path.clone()).collect(),
        })
    }

    fn link_module(
        &self,
        graph: &mut ModuleGraph,
        path: &Path,
        source: &str,
    ) -> Result<(String, BTreeMap<String, usize>), StageError> {
        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str::<serde_json::Value>(source)
                .map_err(|e| StageError::transform(path, e))?;
            return Ok((format!("module.exports = {};\n", source.trim()), BTreeMap::new()));
        }

        let mut module = rewrite::rewrite_module(
            path,
            source,
            RewriteOptions {
                cherry_pick: &self.options.cherry_pick,
            },
        )?;

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut deps = BTreeMap::new();

        for request in &module.requests {
            match resolve::resolve(self.fs, dir, &request.specifier) {
                Some(target) => {
                    deps.insert(request.specifier.clone(), graph.id_of(&target));
                }
                None if request.kind == RequestKind::Import => {
                    return Err(StageError::transform(
                        path,
                        format!("cannot resolve import '{}'", request.specifier),
                    ));
                }
                None => {
                    warn!(module = ?path, specifier = %request.specifier, "unresolved require left to fail at runtime");
                }
            }
        }

        self.provide(graph, path, dir, source, &mut module, &mut deps);
        Ok((module.code, deps))
    }

    /// Declare provided globals that `module` references without binding.
    fn provide(
        &self,
        graph: &mut ModuleGraph,
        path: &Path,
        dir: &Path,
        source: &str,
        module: &mut RewrittenModule,
        deps: &mut BTreeMap<String, usize>,
    ) {
        let mut lines = String::new();
        for (name, specifier) in &self.options.provide {
            if module.top_level.contains(name) || !references(source, name) {
                continue;
            }
            let Some(target) = resolve::resolve(self.fs, dir, specifier) else {
                warn!(module = ?path, name = %name, specifier = %specifier, "provided module not found; skipping");
                continue;
            };
            if target == path {
                continue;
            }
            deps.insert(specifier.clone(), graph.id_of(&target));

            let require = format!("require({})", serde_json::to_string(specifier).unwrap_or_default());
            if IDENTIFIER.is_match(name) {
                lines.push_str(&format!("var {name} = {require};\n"));
            } else {
                lines.push_str(&format!("{name} = {require};\n"));
            }
        }
        if !lines.is_empty() {
            module.insert(&lines);
        }
    }
}

/// Whether `name` (an identifier or a dotted member path) appears in
/// `source` as a whole token.
fn references(source: &str, name: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    source.match_indices(name).any(|(idx, _)| {
        let before = source[..idx].chars().next_back();
        let after = source[idx + name.len()..].chars().next();
        !before.is_some_and(|c| is_word(c) || c == '.') && !after.is_some_and(is_word)
    })
}
