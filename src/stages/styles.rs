// src/stages/styles.rs

//! Style stage: SCSS compilation, prefixing and minification.

use std::io;
use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use parcel_sourcemap::SourceMap;

use crate::environment::Environment;
use crate::errors::StageError;
use crate::fs::FileSystem;
use crate::paths::AssetCategory;
use crate::pipeline::{Asset, Pipeline, Step};
use crate::stages::{BuildContext, Stage, StageReport, read_entry};

#[derive(Debug, Clone, Copy, Default)]
pub struct StyleStage;

impl Stage for StyleStage {
    fn category(&self) -> AssetCategory {
        AssetCategory::Styles
    }

    fn run(&self, ctx: &BuildContext) -> Result<StageReport, StageError> {
        let mut report = StageReport::default();
        let (entry, source) = read_entry(ctx, AssetCategory::Styles)?;

        let targets = browser_targets(&entry, &ctx.browsers)?;
        let pipeline = style_pipeline(ctx.env, ctx.fs.clone(), targets);
        let asset = pipeline.run(Asset::new(&entry, "styles.css", source))?;

        let output = ctx.paths.category(AssetCategory::Styles).dest.join(&asset.output);
        ctx.emit(&mut report, &output, asset.contents.as_bytes())?;
        Ok(report)
    }
}

/// Steps, in order: compile, then either inline source map (development) or
/// prefix + minify + `.min` rename (production).
pub fn style_pipeline(env: Environment, fs: Arc<dyn FileSystem>, targets: Targets) -> Pipeline<Asset> {
    let compile: Step<Asset> = Box::new(move |asset: Asset| compile_scss(fs.as_ref(), asset));
    let source_map: Step<Asset> = Box::new(inline_source_map);
    let minify: Step<Asset> = Box::new(move |asset: Asset| minify_css(asset, targets));
    let rename: Step<Asset> = Box::new(|asset: Asset| Ok(asset.with_suffix(".min")));

    Pipeline::new()
        .then("compile", compile)
        .then("source-map", env.when(Environment::Development, source_map))
        .then("prefix-minify", env.when(Environment::Production, minify))
        .then("rename", env.when(Environment::Production, rename))
}

/// Resolve browserslist queries into lightningcss targets.
pub fn browser_targets(entry: &Path, queries: &[String]) -> Result<Targets, StageError> {
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str))
        .map_err(|e| StageError::transform(entry, format!("invalid browser query: {e}")))?;
    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

/// Imports resolve through the build filesystem.
#[derive(Debug)]
struct ImportFs<'a>(&'a dyn FileSystem);

impl grass::Fs for ImportFs<'_> {
    fn is_dir(&self, path: &Path) -> bool {
        self.0.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.0.is_file(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.0.read(path).map_err(io::Error::other)
    }
}

fn compile_scss(fs: &dyn FileSystem, mut asset: Asset) -> Result<Asset, StageError> {
    let import_fs = ImportFs(fs);
    let options = grass::Options::default()
        .fs(&import_fs)
        .style(grass::OutputStyle::Expanded);
    asset.contents = grass::from_path(&asset.source, &options)
        .map_err(|e| StageError::transform(&asset.source, e))?;
    Ok(asset)
}

fn source_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Name the compiled stylesheet goes by inside its source map
/// (`styles.scss` → `styles.scss.css`).
fn compiled_name(asset: &Asset) -> String {
    let entry = asset
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{entry}.css")
}

/// Re-print the compiled CSS with a source map and append it as a
/// base64 data URL.
///
/// The SCSS compiler records no positions, so the map is CSS to CSS: its
/// single source is the compiled stylesheet, embedded as source content.
fn inline_source_map(mut asset: Asset) -> Result<Asset, StageError> {
    let compiled = compiled_name(&asset);
    let fail = |e: &dyn std::fmt::Display| StageError::transform(&asset.source, e.to_string());

    let mut map = SourceMap::new("/");
    map.add_source(&compiled);
    map.set_source_content(0, &asset.contents).map_err(|e| fail(&e))?;

    let printed = {
        let sheet = StyleSheet::parse(
            &asset.contents,
            ParserOptions {
                filename: compiled.clone(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| fail(&e))?;
        sheet
            .to_css(PrinterOptions {
                source_map: Some(&mut map),
                ..PrinterOptions::default()
            })
            .map_err(|e| fail(&e))?
            .code
    };

    let json = map.to_json(None).map_err(|e| fail(&e))?;
    let encoded = general_purpose::STANDARD.encode(json.as_bytes());
    asset.contents = format!(
        "{printed}\n/*# sourceMappingURL=data:application/json;base64,{encoded} */\n"
    );
    asset.source_map = Some(json);
    Ok(asset)
}

fn minify_css(mut asset: Asset, targets: Targets) -> Result<Asset, StageError> {
    let filename = source_name(&asset.source);
    let code = {
        let mut sheet = StyleSheet::parse(
            &asset.contents,
            ParserOptions {
                filename,
                ..ParserOptions::default()
            },
        )
        .map_err(|e| StageError::transform(&asset.source, e))?;
        sheet
            .minify(MinifyOptions {
                targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| StageError::transform(&asset.source, e))?;
        sheet
            .to_css(PrinterOptions {
                minify: true,
                targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| StageError::transform(&asset.source, e))?
            .code
    };
    asset.contents = code;
    Ok(asset)
}
