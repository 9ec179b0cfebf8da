// src/stages/templates.rs

//! Template stage: reference injection and production minification.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::environment::Environment;
use crate::errors::StageError;
use crate::fs::walk_files;
use crate::paths::AssetCategory;
use crate::pipeline::{Pipeline, Step};
use crate::stages::{BuildContext, Stage, StageReport, collect_inputs};

static INJECT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)([ \t]*)<!--\s*inject:(css|js)\s*-->.*?<!--\s*endinject\s*-->")
        .expect("inject block pattern")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateStage;

/// Built asset URLs available for injection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Injections {
    pub css: Vec<String>,
    pub js: Vec<String>,
}

impl Stage for TemplateStage {
    fn category(&self) -> AssetCategory {
        AssetCategory::Templates
    }

    fn run(&self, ctx: &BuildContext) -> Result<StageReport, StageError> {
        let mut report = StageReport::default();
        let injections = built_assets(ctx)?;
        debug!(css = ?injections.css, js = ?injections.js, "template injections");

        let pipeline = template_pipeline(ctx.env, injections);

        for source in collect_inputs(ctx, AssetCategory::Templates)? {
            match render(ctx, &pipeline, &source) {
                Ok(Some((output, html))) => ctx.emit(&mut report, &output, html.as_bytes())?,
                Ok(None) => report.skipped += 1,
                Err(err) if ctx.env.is_production() => {
                    ctx.reporter.report(AssetCategory::Templates, &err);
                    report.reported.push(err.to_string());
                }
                Err(err) => return Err(err),
            }
        }

        Ok(report)
    }
}

fn render(
    ctx: &BuildContext,
    pipeline: &Pipeline<String>,
    source: &Path,
) -> Result<Option<(PathBuf, String)>, StageError> {
    let Some(output) = ctx.paths.output_for(AssetCategory::Templates, source) else {
        return Ok(None);
    };
    let html = ctx
        .fs
        .read_to_string(source)
        .map_err(|e| StageError::io(source, e))?;
    let html = pipeline.run(html)?;
    Ok(Some((output, html)))
}

fn template_pipeline(env: Environment, injections: Injections) -> Pipeline<String> {
    let minify: Step<String> = Box::new(|html: String| Ok(minify_html(&html)));
    Pipeline::new()
        .then("inject", Box::new(move |html: String| Ok(inject(&html, &injections))))
        .then("minify", env.when(Environment::Production, minify))
}

/// Stylesheets and scripts currently present in the destination, as
/// root-relative URLs sorted by name.
pub fn built_assets(ctx: &BuildContext) -> Result<Injections, StageError> {
    let list = |category: AssetCategory, ext: &str| -> Result<Vec<String>, StageError> {
        let dir = &ctx.paths.category(category).dest;
        let files = walk_files(ctx.fs.as_ref(), dir).map_err(|e| StageError::io(dir, e))?;
        Ok(files
            .iter()
            .filter(|p| p.parent() == Some(dir.as_path()))
            .filter(|p| p.extension().is_some_and(|e| e == ext))
            .filter_map(|p| ctx.paths.public_url(p))
            .collect())
    };

    Ok(Injections {
        css: list(AssetCategory::Styles, "css")?,
        js: list(AssetCategory::Scripts, "js")?,
    })
}

/// Replace the contents of every injection block.
///
/// Lines of the block are indented like its start marker. Templates
/// without markers come back unchanged.
pub fn inject(html: &str, injections: &Injections) -> String {
    INJECT_BLOCK
        .replace_all(html, |caps: &Captures<'_>| {
            let indent = &caps[1];
            let kind = &caps[2];
            let tags: Vec<String> = match kind {
                "css" => injections
                    .css
                    .iter()
                    .map(|url| format!(r#"<link rel="stylesheet" href="{url}">"#))
                    .collect(),
                _ => injections
                    .js
                    .iter()
                    .map(|url| format!(r#"<script src="{url}"></script>"#))
                    .collect(),
            };

            let mut block = format!("{indent}<!-- inject:{kind} -->\n");
            for tag in tags {
                block.push_str(indent);
                block.push_str(&tag);
                block.push('\n');
            }
            block.push_str(indent);
            block.push_str("<!-- endinject -->");
            block
        })
        .into_owned()
}

/// Strip comments and collapse whitespace.
///
/// Closing tags and the `html`/`head` start tags are kept so the dev server
/// can still find `</body>`. Contents of `pre`, `textarea`, `script` and
/// `style` elements are copied through untouched.
pub fn minify_html(html: &str) -> String {
    let mut cfg = ::minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = false;
    cfg.minify_js = false;
    let minified = ::minify_html::minify(html.as_bytes(), &cfg);
    String::from_utf8_lossy(&minified).into_owned()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ConfigFile;
    use crate::fs::FileSystem;
    use crate::fs::mock::MockFileSystem;
    use crate::paths::PathConfig;
    use crate::stages::CollectingReporter;

    const PAGE: &str = "<html>\n  <head>\n    <!-- inject:css -->\n    <!-- endinject -->\n  </head>\n  <body>\n    <!-- inject:js -->\n    <script src=\"/old.js\"></script>\n    <!-- endinject -->\n  </body>\n</html>\n";

    fn ctx(fs: &MockFileSystem, env: Environment) -> BuildContext {
        BuildContext::new(
            &ConfigFile::default(),
            Arc::new(PathConfig::default()),
            env,
            Arc::new(fs.clone()),
        )
    }

    #[test]
    fn injects_existing_outputs_with_marker_indentation() {
        let injections = Injections {
            css: vec!["/styles/styles.css".to_string()],
            js: vec!["/scripts/scripts.js".to_string()],
        };
        let html = inject(PAGE, &injections);
        assert!(html.contains(
            "    <!-- inject:css -->\n    <link rel=\"stylesheet\" href=\"/styles/styles.css\">\n    <!-- endinject -->"
        ));
        assert!(html.contains("    <script src=\"/scripts/scripts.js\"></script>\n"));
        assert!(!html.contains("/old.js"));
    }

    #[test]
    fn template_without_markers_is_unchanged() {
        let html = "<p>plain</p>\n";
        assert_eq!(inject(html, &Injections::default()), html);
    }

    #[test]
    fn minify_keeps_preformatted_content() {
        let html = "<div>\n  <!-- note -->\n  <pre>  keep\n  this </pre>\n  <p>a   b</p>\n</div>";
        let out = minify_html(html);
        assert!(out.contains("<pre>  keep\n  this </pre>"));
        assert!(out.contains("<p>a b</p>"));
        assert!(!out.contains("note"));
    }

    #[test]
    fn minify_keeps_space_between_inline_elements() {
        let out = minify_html("<p><span>Hello</span> <span>World</span></p>");
        assert!(out.contains("<span>Hello</span> <span>World</span>"));
    }

    #[test]
    fn minify_leaves_script_and_style_bodies_alone() {
        let html = "<style>\n  a  { color: red }\n</style>\n<script>\n  var  x = 1;\n</script>";
        let out = minify_html(html);
        assert!(out.contains("a  { color: red }"));
        assert!(out.contains("var  x = 1;"));
    }

    #[test]
    fn only_existing_outputs_are_referenced() {
        let fs = MockFileSystem::new();
        fs.add_file("src/index.html", PAGE);
        fs.add_file("dist/styles/styles.css", "a{}");
        fs.add_file("dist/styles/styles.css.map", "{}");

        TemplateStage.run(&ctx(&fs, Environment::Development)).unwrap();

        let out = fs.read_to_string(Path::new("dist/index.html")).unwrap();
        assert!(out.contains("href=\"/styles/styles.css\""));
        assert!(!out.contains(".map"));
        assert!(!out.contains("<script"));
    }

    #[test]
    fn production_minifies_after_injection() {
        let fs = MockFileSystem::new();
        fs.add_file("src/index.html", PAGE);
        fs.add_file("dist/scripts/scripts.min.js", "1");

        TemplateStage.run(&ctx(&fs, Environment::Production)).unwrap();

        let out = fs.read_to_string(Path::new("dist/index.html")).unwrap();
        assert!(out.contains("<head>"));
        assert!(out.contains("/scripts/scripts.min.js"));
        assert!(out.contains("</body>"));
        assert!(!out.contains("<!--"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn production_reports_unreadable_template_and_continues() {
        let fs = MockFileSystem::new();
        fs.add_file("src/bad.html", vec![0xff, 0xfe]);
        fs.add_file("src/good.html", "<p>ok</p>");
        let reporter = Arc::new(CollectingReporter::new());
        let ctx = ctx(&fs, Environment::Production).with_reporter(reporter.clone());

        let report = TemplateStage.run(&ctx).unwrap();
        assert_eq!(report.reported.len(), 1);
        assert_eq!(reporter.messages().len(), 1);
        assert!(fs.exists(Path::new("dist/good.html")));
    }

    #[test]
    fn development_fails_on_unreadable_template() {
        let fs = MockFileSystem::new();
        fs.add_file("src/bad.html", vec![0xff, 0xfe]);
        assert!(TemplateStage.run(&ctx(&fs, Environment::Development)).is_err());
    }
}
