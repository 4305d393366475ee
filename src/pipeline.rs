//! End-to-end analysis: rasterize, sample, cluster, build the palette, render.
//!
//! Every run is an independent computation over one working canvas and one
//! settings snapshot; nothing is kept between runs.

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::kmeans::cluster;
use crate::payload::DesignPayload;
use crate::preview::{Preview, render_preview};
use crate::raster::{WorkingCanvas, rasterize_bytes};
use crate::sample::{SampleOptions, sample};
use crate::settings::Settings;
use crate::swatch::{PaletteEntry, build_palette, merge_by_distance};

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub estimated_color_count: usize,
    pub palette: Vec<PaletteEntry>,
    pub preview: Option<Preview>,
    /// The clamped snapshot this result was computed with.
    pub settings: Settings,
    /// Number of samples the palette percentages are relative to.
    pub sampled_pixels: usize,
}

impl Analysis {
    /// The "no design content" result.
    pub fn empty(settings: Settings) -> Self {
        Self {
            estimated_color_count: 0,
            palette: Vec::new(),
            preview: None,
            settings,
            sampled_pixels: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    pub fn payload(&self) -> DesignPayload {
        DesignPayload::from_analysis(self)
    }
}

/// Re-runs the analysis on an already rasterized canvas.
#[instrument(skip(settings, canvas), fields(width = canvas.width(), height = canvas.height()))]
pub fn recompute(settings: &Settings, canvas: &WorkingCanvas) -> Analysis {
    let settings = settings.clamped();

    let samples = {
        let _span = tracing::info_span!("sample").entered();
        sample(canvas, &SampleOptions::from(&settings))
    };
    if samples.is_empty() {
        info!("No artwork pixels above alpha threshold {}", settings.alpha_threshold);
        return Analysis::empty(settings);
    }

    let clustering = {
        let _span = tracing::info_span!("cluster", k = settings.color_count).entered();
        cluster(&samples, settings.color_count, settings.seed)
    };

    let palette = {
        let _span = tracing::info_span!("build_palette").entered();
        let built = build_palette(
            &clustering.centroids,
            &clustering.assignments,
            samples.len(),
            settings.min_pct,
            settings.min_pixels,
        );
        merge_by_distance(&built, samples.len(), settings.merge_distance)
    };

    let preview = {
        let _span = tracing::info_span!("render_preview").entered();
        render_preview(canvas, &palette, &settings)
    };

    info!(
        "Analysis complete: {} colors from {} samples",
        palette.len(),
        samples.len()
    );

    Analysis {
        estimated_color_count: palette.len(),
        palette,
        preview,
        settings,
        sampled_pixels: samples.len(),
    }
}

/// Decodes and rasterizes `bytes`, then analyzes the resulting canvas.
#[instrument(skip(bytes, settings), fields(input_size = bytes.len()))]
pub fn analyze_bytes(bytes: &[u8], settings: &Settings) -> Result<Analysis> {
    let settings = settings.clamped();
    let canvas = {
        let _span = tracing::info_span!("rasterize", max_dim = settings.max_working_dim).entered();
        rasterize_bytes(bytes, settings.max_working_dim, settings.pixel_ratio)?
    };
    Ok(recompute(&settings, &canvas))
}

/// Like [`analyze_bytes`], but an undecodable upload yields the empty result.
pub fn analyze_or_empty(bytes: &[u8], settings: &Settings) -> Analysis {
    match analyze_bytes(bytes, settings) {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("Falling back to an empty palette: {}", e);
            Analysis::empty(settings.clamped())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn flat(width: u32, height: u32, pixel: [u8; 4]) -> WorkingCanvas {
        WorkingCanvas::from_rgba(RgbaImage::from_pixel(width, height, Rgba(pixel))).unwrap()
    }

    #[test]
    fn test_transparent_canvas_is_empty() {
        let analysis = recompute(&Settings::default(), &flat(20, 20, [255, 0, 0, 0]));
        assert_eq!(analysis.estimated_color_count, 0);
        assert!(analysis.palette.is_empty());
        assert!(analysis.preview.is_none());
    }

    #[test]
    fn test_below_threshold_canvas_is_empty() {
        let settings = Settings { alpha_threshold: 200, ..Settings::default() };
        let analysis = recompute(&settings, &flat(20, 20, [255, 0, 0, 199]));
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_recompute_records_clamped_settings() {
        let settings = Settings { color_count: 99, ..Settings::default() };
        let analysis = recompute(&settings, &flat(10, 10, [1, 2, 3, 255]));
        assert_eq!(analysis.settings.color_count, 8);
        assert_eq!(analysis.sampled_pixels, 100);
    }

    #[test]
    fn test_filters_can_drop_everything() {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        for x in 0..5 {
            for y in 0..10 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let canvas = WorkingCanvas::from_rgba(image).unwrap();
        let settings = Settings { color_count: 2, min_pct: 75.0, ..Settings::default() };

        let analysis = recompute(&settings, &canvas);
        assert_eq!(analysis.estimated_color_count, 0);
        assert!(analysis.preview.is_none());
        assert_eq!(analysis.sampled_pixels, 100);
    }

    #[test]
    fn test_undecodable_bytes() {
        assert!(analyze_bytes(b"garbage", &Settings::default()).is_err());

        let analysis = analyze_or_empty(b"garbage", &Settings::default());
        assert!(analysis.is_empty());
        assert_eq!(analysis.settings, Settings::default());
    }
}
