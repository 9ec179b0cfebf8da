//! Bundle assembly.
//!
//! Modules are stored in an array indexed by id. Each entry pairs the
//! module function with a map from the specifiers it requests to the ids
//! they resolved to. Module 0 is the entry and runs on load.

use std::collections::BTreeMap;
use std::path::PathBuf;

const PRELUDE: &str = r#"(function (modules) {
  var cache = {};
  function load(id) {
    var cached = cache[id];
    if (cached) return cached.exports;
    var module = (cache[id] = { exports: {} });
    var entry = modules[id];
    entry[0].call(module.exports, module, module.exports, function (request) {
      var target = entry[1][request];
      if (target === undefined) throw new Error("Cannot find module '" + request + "'");
      return load(target);
    });
    return module.exports;
  }
  load(0);
})(["#;

const EPILOGUE: &str = "]);\n";

#[derive(Debug, Clone)]
pub struct BundledModule {
    pub path: PathBuf,
    pub code: String,
    /// Specifier → module id.
    pub deps: BTreeMap<String, usize>,
}

/// Concatenate modules, in id order, into one self-executing script.
pub fn assemble(modules: &[BundledModule]) -> String {
    let size: usize = modules.iter().map(|m| m.code.len() + 64).sum();
    let mut out = String::with_capacity(PRELUDE.len() + size + EPILOGUE.len());
    out.push_str(PRELUDE);
    out.push('\n');

    for (id, module) in modules.iter().enumerate() {
        let deps = serde_json::to_string(&module.deps).unwrap_or_else(|_| "{}".to_string());
        out.push_str(&format!(
            "/* {id}: {} */\n[function (module, exports, require) {{\n",
            module.path.to_string_lossy().replace('\\', "/").replace("*/", "*\\/")
        ));
        out.push_str(&module.code);
        if !module.code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("}}, {deps}],\n"));
    }

    out.push_str(EPILOGUE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_are_listed_in_id_order_with_dependency_maps() {
        let modules = vec![
            BundledModule {
                path: PathBuf::from("src/scripts/scripts.js"),
                code: "require(\"./a\");".to_string(),
                deps: BTreeMap::from([("./a".to_string(), 1)]),
            },
            BundledModule {
                path: PathBuf::from("src/scripts/a.js"),
                code: "module.exports = 1;\n".to_string(),
                deps: BTreeMap::new(),
            },
        ];
        let bundle = assemble(&modules);
        let first = bundle.find("/* 0: src/scripts/scripts.js */").unwrap();
        let second = bundle.find("/* 1: src/scripts/a.js */").unwrap();
        assert!(first < second);
        assert!(bundle.contains("}, {\"./a\":1}],"));
        assert!(bundle.contains("}, {}],"));
        assert!(bundle.starts_with("(function (modules) {"));
        assert!(bundle.ends_with("]);\n"));
    }
}
