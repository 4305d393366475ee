//! Quantized preview rendering.
//!
//! Shows the shopper what the print looks like once reduced to the estimated
//! inks: every artwork pixel is snapped to its nearest palette color.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops::FilterType};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::kmeans::nearest_index;
use crate::raster::{WorkingCanvas, bounded_size};
use crate::sample::is_artwork;
use crate::settings::Settings;
use crate::swatch::PaletteEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    image: RgbaImage,
}

impl Preview {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        {
            let mut cursor = Cursor::new(&mut buf);
            DynamicImage::ImageRgba8(self.image.clone())
                .write_to(&mut cursor, ImageFormat::Png)
                .map_err(|e| AnalysisError::EncodeError(e.to_string()))?;
        }
        Ok(buf)
    }

    /// `data:image/png;base64,...`, ready to drop into an `<img>` or canvas.
    pub fn to_data_url(&self) -> Result<String> {
        let png = self.to_png()?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
    }
}

/// Renders the quantized preview, or `None` when the palette is empty.
pub fn render_preview(
    canvas: &WorkingCanvas,
    palette: &[PaletteEntry],
    settings: &Settings,
) -> Option<Preview> {
    let paint: Vec<[u8; 3]> = palette.iter().map(|entry| entry.rgb).collect();
    render_recolored_preview(canvas, palette, &paint, settings)
}

/// Like [`render_preview`], but pixels matched to palette entry `i` are painted
/// with `paint[i]`.
///
/// Matching still uses the palette's own colors, so a swatch edited by hand
/// recolors the preview without re-running the analysis. Missing `paint` slots
/// fall back to the palette color.
pub fn render_recolored_preview(
    canvas: &WorkingCanvas,
    palette: &[PaletteEntry],
    paint: &[[u8; 3]],
    settings: &Settings,
) -> Option<Preview> {
    if palette.is_empty() {
        return None;
    }

    let centers: Vec<[f64; 3]> = palette.iter().map(|entry| entry.rgb.map(f64::from)).collect();
    let inks: Vec<[u8; 3]> = palette
        .iter()
        .enumerate()
        .map(|(idx, entry)| paint.get(idx).copied().unwrap_or(entry.rgb))
        .collect();

    let (width, height) = (canvas.width(), canvas.height());
    let (target_w, target_h) =
        bounded_size(width as f64, height as f64, settings.max_preview_dim, 1.0);
    let mut image = if (target_w, target_h) == (width, height) {
        canvas.image().clone()
    } else {
        image::imageops::resize(canvas.image(), target_w, target_h, FilterType::Triangle)
    };

    for pixel in image.pixels_mut() {
        let alpha = pixel[3];
        if !is_artwork(alpha, settings.alpha_threshold) {
            *pixel = Rgba([0, 0, 0, 0]);
            continue;
        }
        let point = [pixel[0], pixel[1], pixel[2]].map(f64::from);
        let [r, g, b] = inks[nearest_index(point, &centers)];
        *pixel = Rgba([r, g, b, alpha]);
    }

    debug!(
        "Rendered preview {}x{} with {} inks",
        target_w,
        target_h,
        inks.len()
    );
    Some(Preview { image })
}
