// src/stages/scripts.rs

//! Script stage: bundle, transpile, minify and source maps.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose;
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{TransformOptions, Transformer};
use tracing::debug;

use crate::bundler::Bundler;
use crate::config::ScriptsSection;
use crate::environment::Environment;
use crate::errors::StageError;
use crate::fs::FileSystem;
use crate::paths::AssetCategory;
use crate::pipeline::{Asset, Pipeline, Step};
use crate::stages::{BuildContext, Stage, StageReport, read_entry};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptStage;

impl Stage for ScriptStage {
    fn category(&self) -> AssetCategory {
        AssetCategory::Scripts
    }

    fn run(&self, ctx: &BuildContext) -> Result<StageReport, StageError> {
        let mut report = StageReport::default();
        let (entry, source) = read_entry(ctx, AssetCategory::Scripts)?;

        let pipeline = script_pipeline(ctx.env, ctx.fs.clone(), ctx.scripts.clone());
        let asset = pipeline.run(Asset::new(&entry, "scripts.js", source))?;

        let output = ctx.paths.category(AssetCategory::Scripts).dest.join(&asset.output);
        if ctx.env.is_production() {
            if let Some(map) = &asset.source_map {
                ctx.emit(&mut report, &map_path(&output), map.as_bytes())?;
            }
        }
        ctx.emit(&mut report, &output, asset.contents.as_bytes())?;
        Ok(report)
    }
}

/// Steps, in order: bundle, transpile, then either an inline source map
/// (development) or minify + `.min` rename + external map link (production).
pub fn script_pipeline(
    env: Environment,
    fs: Arc<dyn FileSystem>,
    options: ScriptsSection,
) -> Pipeline<Asset> {
    let target = options.target.clone();

    let bundle: Step<Asset> = Box::new(move |mut asset: Asset| {
        let bundle = Bundler::new(fs.as_ref(), &options).bundle(&asset.source, &asset.contents)?;
        debug!(modules = bundle.modules.len(), "script bundle assembled");
        asset.contents = bundle.code;
        Ok(asset)
    });
    let transpile: Step<Asset> = Box::new(move |asset: Asset| transpile(asset, &target));
    let minify: Step<Asset> = Box::new(minify_js);
    let source_map: Step<Asset> = Box::new(inline_source_map);
    let rename: Step<Asset> = Box::new(|asset: Asset| Ok(asset.with_suffix(".min")));
    let link_map: Step<Asset> = Box::new(link_source_map);

    Pipeline::new()
        .then("bundle", bundle)
        .then("transpile", transpile)
        .then("minify", env.when(Environment::Production, minify))
        .then("source-map", env.when(Environment::Development, source_map))
        .then("rename", env.when(Environment::Production, rename))
        .then("link-map", env.when(Environment::Production, link_map))
}

/// `scripts.min.js` → `scripts.min.js.map`.
pub fn map_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".map");
    PathBuf::from(name)
}

fn first_error<E: ToString>(path: &Path, errors: &[E]) -> Result<(), StageError> {
    match errors.first() {
        Some(err) => Err(StageError::transform(path, err.to_string())),
        None => Ok(()),
    }
}

fn codegen_options(asset: &Asset, minify: bool) -> CodegenOptions {
    CodegenOptions {
        minify,
        comments: if minify {
            CommentOptions::disabled()
        } else {
            CommentOptions::default()
        },
        source_map_path: Some(asset.output.clone()),
        ..CodegenOptions::default()
    }
}

/// Lower the bundle to the configured ECMAScript target.
fn transpile(mut asset: Asset, target: &str) -> Result<Asset, StageError> {
    let options = TransformOptions::from_target(target)
        .map_err(|e| StageError::transform(&asset.source, format!("invalid script target '{target}': {e}")))?;

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &asset.contents, SourceType::cjs()).parse();
    first_error(&asset.source, &ret.errors)?;
    let mut program = ret.program;

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let transformed = Transformer::new(&allocator, &asset.source, &options)
        .build_with_scoping(scoping, &mut program);
    first_error(&asset.source, &transformed.errors)?;

    let printed = Codegen::new()
        .with_options(codegen_options(&asset, false))
        .build(&program);
    asset.contents = printed.code;
    asset.source_map = printed.map.map(|map| map.to_json_string());
    Ok(asset)
}

/// The map produced here relates the minified code to the transpiled
/// bundle; it is not composed with the transpile map.
fn minify_js(mut asset: Asset) -> Result<Asset, StageError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &asset.contents, SourceType::cjs()).parse();
    first_error(&asset.source, &ret.errors)?;
    let mut program = ret.program;

    let options = MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);
    let printed = Codegen::new()
        .with_options(codegen_options(&asset, true))
        .with_scoping(ret.scoping)
        .build(&program);
    asset.contents = printed.code;
    asset.source_map = printed.map.map(|map| map.to_json_string());
    Ok(asset)
}

fn inline_source_map(mut asset: Asset) -> Result<Asset, StageError> {
    if let Some(json) = &asset.source_map {
        let encoded = general_purpose::STANDARD.encode(json.as_bytes());
        asset.contents = format!(
            "{}\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{encoded}\n",
            asset.contents.trim_end()
        );
    }
    Ok(asset)
}

fn link_source_map(mut asset: Asset) -> Result<Asset, StageError> {
    if asset.source_map.is_some() {
        let name = map_path(&asset.output);
        asset.contents = format!(
            "{}\n//# sourceMappingURL={}\n",
            asset.contents.trim_end(),
            name.to_string_lossy()
        );
    }
    Ok(asset)
}
