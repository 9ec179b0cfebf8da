#![allow(dead_code)]

pub use assetpipe_test_utils::builders;
pub use assetpipe_test_utils::{init_tracing, with_timeout};

use std::collections::BTreeMap;

use assetpipe::dag::DagGraph;
use assetpipe::engine::TaskOutcome;
use assetpipe::exec::StageRunner;
use assetpipe::stages::BuildContext;

use self::builders::SourceTree;

/// A small but complete project: one template with both injection
/// blocks, an SCSS entry with a partial, a two-module script, an SVG and
/// a font.
pub fn sample_project() -> SourceTree {
    SourceTree::new()
        .file(
            "src/index.html",
            "<html>\n<head>\n  <!-- inject:css -->\n  <!-- endinject -->\n</head>\n<body>\n  <h1>Hi</h1>\n  <!-- inject:js -->\n  <!-- endinject -->\n</body>\n</html>\n",
        )
        .file("src/styles.scss", "@import 'styles/base';\n\nbody { color: $ink; }\n")
        .file("src/styles/_base.scss", "$ink: #333;\nh1 { display: flex; }\n")
        .file(
            "src/scripts/scripts.js",
            "import { greet } from './greet';\ndocument.title = greet('world');\n",
        )
        .file(
            "src/scripts/greet.js",
            "export function greet(name) {\n  return 'hello ' + name;\n}\n",
        )
        .file(
            "src/img/dot.svg",
            "<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"4\" height=\"4\"><rect width=\"4\" height=\"4\"/></svg>\n",
        )
        .file("src/fonts/body.woff2", [0u8, 1, 2, 3, 4, 5, 6, 7])
}

/// Run every stage once in dependency order, the way a one-shot build
/// would with a serial executor.
pub fn build(ctx: &BuildContext) -> BTreeMap<String, TaskOutcome> {
    let order = DagGraph::stages()
        .and_then(|graph| graph.topological_order())
        .expect("stage graph is acyclic");
    order
        .into_iter()
        .map(|stage| {
            let outcome = StageRunner::run(ctx, &stage);
            (stage, outcome)
        })
        .collect()
}
