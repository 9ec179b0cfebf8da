// src/stages/images.rs

//! Image stage: skip-if-newer plus format-specific compression.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::errors::StageError;
use crate::paths::AssetCategory;
use crate::stages::newer::is_stale;
use crate::stages::{BuildContext, Stage, StageReport, collect_inputs};

/// PNG quantization: slowest speed, best quality, no lower bound.
const PNG_SPEED: i32 = 1;
const PNG_QUALITY: u8 = 98;

/// Namespace prefixes written by vector editors.
const EDITOR_PREFIXES: &[&str] = &["inkscape", "sodipodi", "sketch", "serif"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageStage;

impl Stage for ImageStage {
    fn category(&self) -> AssetCategory {
        AssetCategory::Images
    }

    fn run(&self, ctx: &BuildContext) -> Result<StageReport, StageError> {
        let mut report = StageReport::default();

        for source in collect_inputs(ctx, AssetCategory::Images)? {
            let Some(output) = ctx.paths.output_for(AssetCategory::Images, &source) else {
                continue;
            };
            if !is_stale(ctx.fs.as_ref(), &source, &output) {
                debug!(path = ?source, "image up to date");
                report.skipped += 1;
                continue;
            }

            let original = ctx.fs.read(&source).map_err(|e| StageError::io(&source, e))?;
            let optimised = optimise(&source, &original, ctx.images.jpeg_quality)?;
            let bytes = smaller_of(&original, optimised);
            debug!(
                path = ?source,
                before = original.len(),
                after = bytes.len(),
                "image optimised"
            );
            ctx.emit(&mut report, &output, &bytes)?;
        }

        Ok(report)
    }
}

/// Keep the re-encoded bytes only if they are strictly smaller.
fn smaller_of(original: &[u8], optimised: Option<Vec<u8>>) -> Cow<'_, [u8]> {
    match optimised {
        Some(bytes) if bytes.len() < original.len() => Cow::Owned(bytes),
        _ => Cow::Borrowed(original),
    }
}

/// Re-encode a single image. `None` means "copy as is".
pub fn optimise(path: &Path, bytes: &[u8], jpeg_quality: u8) -> Result<Option<Vec<u8>>, StageError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let encoded = match ext.as_str() {
        "jpg" | "jpeg" => encode_jpeg(bytes, jpeg_quality),
        "png" => encode_png(bytes),
        "gif" => encode_gif(bytes),
        "svg" => optimise_svg(bytes),
        _ => return Ok(None),
    };
    encoded
        .map(Some)
        .map_err(|message| StageError::transform(path, message))
}

fn encode_jpeg(bytes: &[u8], quality: u8) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).map_err(|e| e.to_string())?;
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    };
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    img.write_with_encoder(encoder).map_err(|e| e.to_string())?;
    Ok(out)
}

/// Quantize to a 256-colour palette and write an indexed PNG.
fn encode_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| e.to_string())?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let pixels: Vec<imagequant::RGBA> = img
        .pixels()
        .map(|p| imagequant::RGBA::new(p[0], p[1], p[2], p[3]))
        .collect();

    let mut liq = imagequant::new();
    liq.set_speed(PNG_SPEED).map_err(|e| e.to_string())?;
    liq.set_quality(0, PNG_QUALITY).map_err(|e| e.to_string())?;
    let mut image = liq
        .new_image(pixels, width as usize, height as usize, 0.0)
        .map_err(|e| e.to_string())?;
    let mut quantized = liq.quantize(&mut image).map_err(|e| e.to_string())?;
    let (palette, indices) = quantized.remapped(&mut image).map_err(|e| e.to_string())?;

    let rgb: Vec<u8> = palette.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
    let alpha: Vec<u8> = palette.iter().map(|c| c.a).collect();

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(png::Compression::Best);
        encoder.set_palette(rgb);
        if alpha.iter().any(|&a| a != u8::MAX) {
            encoder.set_trns(alpha);
        }
        let mut writer = encoder.write_header().map_err(|e| e.to_string())?;
        writer.write_image_data(&indices).map_err(|e| e.to_string())?;
        writer.finish().map_err(|e| e.to_string())?;
    }
    Ok(out)
}

/// Rewrite every frame interlaced, keeping its palette, placement, delay
/// and disposal. The loop count is carried over.
fn encode_gif(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let global_palette = decoder.global_palette().map(<[u8]>::to_vec).unwrap_or_default();
    let (width, height) = (decoder.width(), decoder.height());
    let repeat = decoder.repeat();

    let mut out = Vec::new();
    {
        let mut encoder =
            gif::Encoder::new(&mut out, width, height, &global_palette).map_err(|e| e.to_string())?;
        encoder.set_repeat(repeat).map_err(|e| e.to_string())?;
        while let Some(frame) = decoder.read_next_frame().map_err(|e| e.to_string())? {
            let mut frame = frame.clone();
            if !frame.interlaced {
                let rows = interlace_rows(&frame.buffer, usize::from(frame.width), usize::from(frame.height));
                frame.buffer = Cow::Owned(rows);
                frame.interlaced = true;
            }
            encoder.write_frame(&frame).map_err(|e| e.to_string())?;
        }
    }
    Ok(out)
}

/// Reorder rows into GIF interlace order: every 8th row from 0, every 8th
/// from 4, every 4th from 2, then every 2nd from 1.
fn interlace_rows(buffer: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.len());
    for (start, step) in [(0, 8), (4, 8), (2, 4), (1, 2)] {
        for row in (start..height).step_by(step) {
            if let Some(line) = buffer.get(row * width..(row + 1) * width) {
                out.extend_from_slice(line);
            }
        }
    }
    out
}

fn is_editor_name(name: &[u8]) -> bool {
    let name = String::from_utf8_lossy(name);
    let prefix = match name.strip_prefix("xmlns:") {
        Some(declared) => declared,
        None => match name.split_once(':') {
            Some((prefix, _)) => prefix,
            None => return false,
        },
    };
    EDITOR_PREFIXES.contains(&prefix)
}

fn attr_value<'a>(elem: &'a BytesStart<'_>, key: &[u8]) -> Option<Cow<'a, [u8]>> {
    elem.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| a.value)
}

fn numeric(value: &[u8]) -> Option<f64> {
    let text = String::from_utf8_lossy(value);
    text.trim().trim_end_matches("px").parse().ok()
}

/// `viewBox="0 0 W H"` with `width="W"` and `height="H"` says nothing new.
fn redundant_view_box(elem: &BytesStart<'_>) -> bool {
    let (Some(view_box), Some(width), Some(height)) = (
        attr_value(elem, b"viewBox"),
        attr_value(elem, b"width").and_then(|v| numeric(&v)),
        attr_value(elem, b"height").and_then(|v| numeric(&v)),
    ) else {
        return false;
    };
    let parts: Vec<f64> = String::from_utf8_lossy(&view_box)
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    parts == [0.0, 0.0, width, height]
}

/// Copy of `elem` without editor attributes, and without `viewBox` when
/// `drop_view_box` is set.
fn clean_element(elem: &BytesStart<'_>, drop_view_box: bool) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(elem.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in elem.attributes().flatten() {
        let key = attr.key.as_ref();
        if is_editor_name(key) || (drop_view_box && key == b"viewBox") {
            continue;
        }
        out.push_attribute((key, attr.value.as_ref()));
    }
    out
}

fn is_dropped_element(elem: &BytesStart<'_>) -> bool {
    let name = elem.name();
    name.as_ref() == b"metadata" || is_editor_name(name.as_ref())
}

/// Remove comments, declarations, metadata, editor namespaces and
/// whitespace-only text; drop a redundant root `viewBox`.
pub fn optimise_svg(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut reader = Reader::from_reader(bytes);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len()));
    let mut seen_root = false;
    // Depth inside an element being dropped, 0 when copying.
    let mut skipping = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("SVG parse error at position {}: {e}", reader.error_position()))?;

        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        let out = match event {
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => continue,
            Event::Text(text) if text.iter().all(u8::is_ascii_whitespace) => continue,
            Event::Start(elem) if is_dropped_element(&elem) => {
                skipping = 1;
                continue;
            }
            Event::Empty(elem) if is_dropped_element(&elem) => continue,
            Event::Start(elem) => {
                let root = !seen_root && elem.name().as_ref() == b"svg";
                seen_root = true;
                Event::Start(clean_element(&elem, root && redundant_view_box(&elem)))
            }
            Event::Empty(elem) => {
                let root = !seen_root && elem.name().as_ref() == b"svg";
                seen_root = true;
                Event::Empty(clean_element(&elem, root && redundant_view_box(&elem)))
            }
            other => other.into_owned(),
        };
        writer.write_event(out).map_err(|e| e.to_string())?;
    }

    Ok(writer.into_inner())
}
