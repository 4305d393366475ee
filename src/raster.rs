//! Decoding uploaded artwork and rasterizing it into a bounded working canvas.

use image::{DynamicImage, GenericImageView, RgbaImage, imageops::FilterType};
use resvg::{tiny_skia, usvg};
use tracing::debug;

use crate::error::{AnalysisError, Result};

/// Intrinsic size assumed for vector art that declares neither a size nor a viewBox.
pub const DEFAULT_VECTOR_SIZE: f32 = 1000.0;

const SNIFF_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Raster,
    Vector,
}

enum SourceContent {
    Bitmap(DynamicImage),
    Vector(Box<usvg::Tree>),
}

/// A decoded upload. Immutable once created.
pub struct RasterSource {
    natural_width: f64,
    natural_height: f64,
    content: SourceContent,
}

impl RasterSource {
    /// Wraps a bitmap the caller has already decoded.
    pub fn from_image(img: DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            natural_width: width as f64,
            natural_height: height as f64,
            content: SourceContent::Bitmap(img),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self.content {
            SourceContent::Bitmap(_) => SourceKind::Raster,
            SourceContent::Vector(_) => SourceKind::Vector,
        }
    }

    pub fn natural_width(&self) -> f64 {
        self.natural_width
    }

    pub fn natural_height(&self) -> f64 {
        self.natural_height
    }
}

/// The bounded-resolution RGBA buffer every analysis stage reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingCanvas {
    image: RgbaImage,
}

impl WorkingCanvas {
    pub fn from_rgba(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AnalysisError::InvalidDimensions(width, height));
        }
        Ok(Self { image })
    }

    pub fn from_raw(width: u32, height: u32, raw: Vec<u8>) -> Result<Self> {
        let image = RgbaImage::from_raw(width, height, raw)
            .ok_or(AnalysisError::InvalidDimensions(width, height))?;
        Self::from_rgba(image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Straight-alpha RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Target size for fitting `width x height` inside `max_dim`, preserving aspect ratio.
///
/// Images larger than `max_dim` are scaled down to fit. Smaller images are scaled
/// up by at most `max_upscale` (pass `1.0` to forbid upscaling), still within
/// `max_dim`. Each axis is at least one pixel.
pub fn bounded_size(width: f64, height: f64, max_dim: u32, max_upscale: f64) -> (u32, u32) {
    let width = if width.is_finite() && width > 0.0 { width } else { 1.0 };
    let height = if height.is_finite() && height > 0.0 { height } else { 1.0 };
    let longest = width.max(height);

    let fit = max_dim.max(1) as f64 / longest;
    let scale = fit.min(max_upscale.max(1.0));

    let w = (width * scale).round().max(1.0) as u32;
    let h = (height * scale).round().max(1.0) as u32;
    (w, h)
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    // svgz
    if bytes.starts_with(&[0x1f, 0x8b]) {
        return true;
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_LEN)]);
    let trimmed = head.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with('<') && head.contains("<svg")
}

fn invalid_svg(err: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::DecodeError(format!("invalid SVG: {err}"))
}

fn decode_svg(bytes: &[u8]) -> Result<RasterSource> {
    let inflated;
    let data = if bytes.starts_with(&[0x1f, 0x8b]) {
        inflated = usvg::decompress_svgz(bytes).map_err(invalid_svg)?;
        inflated.as_slice()
    } else {
        bytes
    };
    let text = std::str::from_utf8(data).map_err(invalid_svg)?;
    let parse_options = usvg::roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = usvg::roxmltree::Document::parse_with_options(text, parse_options)
        .map_err(invalid_svg)?;

    // Without width, height or viewBox, usvg sizes the tree to the content's
    // bounding box. Such art is drawn 1:1 into a default-sized viewport instead.
    let root = doc.root_element();
    let sized = ["width", "height", "viewBox"]
        .iter()
        .any(|attr| root.has_attribute(*attr));

    let tree =
        usvg::Tree::from_xmltree(&doc, &usvg::Options::default()).map_err(invalid_svg)?;
    let size = tree.size();
    let (natural_width, natural_height) = if sized {
        (size.width() as f64, size.height() as f64)
    } else {
        (DEFAULT_VECTOR_SIZE as f64, DEFAULT_VECTOR_SIZE as f64)
    };
    debug!("Parsed vector image: {}x{}", natural_width, natural_height);

    Ok(RasterSource {
        natural_width,
        natural_height,
        content: SourceContent::Vector(Box::new(tree)),
    })
}

/// Decodes raster bytes (PNG, JPEG, GIF, WebP, ...) or SVG markup.
pub fn decode(bytes: &[u8]) -> Result<RasterSource> {
    if bytes.is_empty() {
        return Err(AnalysisError::DecodeError("empty input".to_string()));
    }

    if image::guess_format(bytes).is_ok() {
        let img = image::load_from_memory(bytes)?;
        debug!("Decoded raster image: {}x{}", img.width(), img.height());
        return Ok(RasterSource::from_image(img));
    }

    if looks_like_svg(bytes) {
        return decode_svg(bytes);
    }

    Err(AnalysisError::DecodeError(
        "unrecognized image format".to_string(),
    ))
}

/// Draws a decoded source into a working canvas no larger than `max_dim`.
///
/// Bitmaps are never upscaled. Vector art smaller than the target may be
/// upscaled by `pixel_ratio` so it still renders crisply.
pub fn rasterize(source: &RasterSource, max_dim: u32, pixel_ratio: f32) -> Result<WorkingCanvas> {
    match &source.content {
        SourceContent::Bitmap(img) => {
            let (width, height) = img.dimensions();
            let (target_w, target_h) = bounded_size(width as f64, height as f64, max_dim, 1.0);
            let rgba = if (target_w, target_h) == (width, height) {
                img.to_rgba8()
            } else {
                img.resize_exact(target_w, target_h, FilterType::Triangle).to_rgba8()
            };
            debug!(
                "Rasterized bitmap {}x{} -> {}x{}",
                width, height, target_w, target_h
            );
            WorkingCanvas::from_rgba(rgba)
        }
        SourceContent::Vector(tree) => {
            let (target_w, target_h) = bounded_size(
                source.natural_width,
                source.natural_height,
                max_dim,
                pixel_ratio as f64,
            );
            let mut pixmap = tiny_skia::Pixmap::new(target_w, target_h)
                .ok_or(AnalysisError::InvalidDimensions(target_w, target_h))?;
            let transform = tiny_skia::Transform::from_scale(
                (target_w as f64 / source.natural_width) as f32,
                (target_h as f64 / source.natural_height) as f32,
            );
            resvg::render(tree, transform, &mut pixmap.as_mut());

            let mut raw = Vec::with_capacity(target_w as usize * target_h as usize * 4);
            for pixel in pixmap.pixels() {
                let color = pixel.demultiply();
                raw.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
            }
            debug!(
                "Rasterized vector {}x{} -> {}x{}",
                source.natural_width,
                source.natural_height,
                target_w,
                target_h
            );
            WorkingCanvas::from_raw(target_w, target_h, raw)
        }
    }
}

pub fn rasterize_bytes(bytes: &[u8], max_dim: u32, pixel_ratio: f32) -> Result<WorkingCanvas> {
    let source = decode(bytes)?;
    rasterize(&source, max_dim, pixel_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(pixel)));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn test_bounded_size_downscales() {
        assert_eq!(bounded_size(4000.0, 3000.0, 2000, 1.0), (2000, 1500));
        assert_eq!(bounded_size(3000.0, 4000.0, 2000, 1.0), (1500, 2000));
        assert_eq!(bounded_size(5000.0, 10.0, 500, 1.0), (500, 1));
    }

    #[test]
    fn test_bounded_size_no_upscale_for_bitmaps() {
        assert_eq!(bounded_size(120.0, 80.0, 800, 1.0), (120, 80));
    }

    #[test]
    fn test_bounded_size_upscale_is_capped() {
        assert_eq!(bounded_size(100.0, 50.0, 800, 2.0), (200, 100));
        assert_eq!(bounded_size(600.0, 300.0, 800, 2.0), (800, 400));
    }

    #[test]
    fn test_bounded_size_degenerate_input() {
        assert_eq!(bounded_size(0.0, f64::NAN, 100, 1.0), (1, 1));
    }

    #[test]
    fn test_decode_raster() {
        let source = decode(&png(30, 20, [1, 2, 3, 255])).unwrap();
        assert_eq!(source.kind(), SourceKind::Raster);
        assert_eq!(source.natural_width(), 30.0);
        assert_eq!(source.natural_height(), 20.0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not an image"), Err(AnalysisError::DecodeError(_))));
        assert!(matches!(decode(&[]), Err(AnalysisError::DecodeError(_))));
    }

    #[test]
    fn test_decode_rejects_corrupt_png() {
        let mut bytes = png(10, 10, [0, 0, 0, 255]);
        bytes.truncate(40);
        assert!(matches!(decode(&bytes), Err(AnalysisError::DecodeError(_))));
    }

    #[test]
    fn test_decode_rejects_broken_svg() {
        let result = decode(b"<svg xmlns=\"http://www.w3.org/2000/svg\"><rect</svg>");
        assert!(matches!(result, Err(AnalysisError::DecodeError(_))));
    }

    #[test]
    fn test_svg_declared_size() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><rect width="40" height="20" fill="#00ff00"/></svg>"##;
        let source = decode(svg).unwrap();
        assert_eq!(source.kind(), SourceKind::Vector);
        assert_eq!((source.natural_width(), source.natural_height()), (40.0, 20.0));

        let canvas = rasterize(&source, 800, 1.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (40, 20));
        assert_eq!(canvas.image().get_pixel(10, 10).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_svg_view_box_fallback() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 300 150"></svg>"#;
        let source = decode(svg).unwrap();
        assert_eq!((source.natural_width(), source.natural_height()), (300.0, 150.0));
    }

    #[test]
    fn test_svg_default_size() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#;
        let source = decode(svg).unwrap();
        assert_eq!(source.natural_width(), DEFAULT_VECTOR_SIZE as f64);
        assert_eq!(source.natural_height(), DEFAULT_VECTOR_SIZE as f64);

        let canvas = rasterize(&source, 500, 1.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (500, 500));
    }

    #[test]
    fn test_unsized_svg_is_drawn_in_default_viewport() {
        // Content reaching (500, 500) covers the top-left quarter of the
        // 1000x1000 viewport rather than being stretched to fill the canvas.
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg"><rect width="500" height="500" fill="#0000ff"/></svg>"##;
        let source = decode(svg).unwrap();
        assert_eq!((source.natural_width(), source.natural_height()), (1000.0, 1000.0));

        let canvas = rasterize(&source, 800, 1.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (800, 800));
        assert_eq!(canvas.image().get_pixel(200, 200).0, [0, 0, 255, 255]);
        assert_eq!(canvas.image().get_pixel(600, 600).0[3], 0);
    }

    #[test]
    fn test_small_svg_upscaled_by_pixel_ratio() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="50" height="25"></svg>"#;
        let canvas = rasterize_bytes(svg, 800, 2.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (100, 50));
    }

    #[test]
    fn test_bitmap_downscaled_to_working_size() {
        let canvas = rasterize_bytes(&png(400, 300, [9, 9, 9, 255]), 200, 2.0).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (200, 150));
        assert_eq!(canvas.image().get_pixel(100, 75).0, [9, 9, 9, 255]);
    }

    #[test]
    fn test_canvas_rejects_empty_buffers() {
        assert!(WorkingCanvas::from_raw(0, 5, Vec::new()).is_err());
        assert!(WorkingCanvas::from_raw(2, 2, vec![0; 3]).is_err());
    }
}
