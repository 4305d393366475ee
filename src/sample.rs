//! Uniform-stride pixel sampling of a working canvas.

use tracing::debug;

use crate::raster::WorkingCanvas;
use crate::settings::Settings;

/// An `(r, g, b)` sample in `[0, 255]`, possibly fractional after compositing.
pub type Sample = [f64; 3];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOptions {
    pub alpha_threshold: u8,
    pub composite: bool,
    pub background: [u8; 3],
    pub max_samples: usize,
}

impl From<&Settings> for SampleOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            alpha_threshold: settings.alpha_threshold,
            composite: settings.composite,
            background: settings.background,
            max_samples: settings.max_samples,
        }
    }
}

/// Whether a pixel with this alpha belongs to the artwork.
#[inline(always)]
pub fn is_artwork(alpha: u8, alpha_threshold: u8) -> bool {
    alpha != 0 && alpha >= alpha_threshold
}

/// Step between sampled pixels so that at most `max_samples` are visited.
pub fn sample_stride(total_pixels: usize, max_samples: usize) -> usize {
    let max_samples = max_samples.max(1);
    if total_pixels > max_samples {
        total_pixels.div_ceil(max_samples)
    } else {
        1
    }
}

/// Collects RGB samples at a fixed stride over the canvas.
///
/// Pixels below the alpha threshold are skipped. Translucent pixels are blended
/// onto the background when compositing is on, otherwise their raw RGB is kept.
/// A canvas with no artwork pixels yields an empty vector.
pub fn sample(canvas: &WorkingCanvas, options: &SampleOptions) -> Vec<Sample> {
    let total = canvas.pixel_count();
    let stride = sample_stride(total, options.max_samples);
    let background = options.background.map(f64::from);
    let raw = canvas.as_raw();

    let mut samples = Vec::with_capacity(total.div_ceil(stride));
    for pixel in raw.chunks_exact(4).step_by(stride) {
        let alpha = pixel[3];
        if !is_artwork(alpha, options.alpha_threshold) {
            continue;
        }

        let rgb = [pixel[0], pixel[1], pixel[2]].map(f64::from);
        if options.composite && alpha < 255 {
            let ratio = alpha as f64 / 255.0;
            samples.push([
                rgb[0] * ratio + background[0] * (1.0 - ratio),
                rgb[1] * ratio + background[1] * (1.0 - ratio),
                rgb[2] * ratio + background[2] * (1.0 - ratio),
            ]);
        } else {
            samples.push(rgb);
        }
    }

    debug!(
        "Sampled {} of {} pixels (stride {})",
        samples.len(),
        total,
        stride
    );
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn options() -> SampleOptions {
        SampleOptions {
            alpha_threshold: 16,
            composite: true,
            background: [255, 255, 255],
            max_samples: 1_000_000,
        }
    }

    fn canvas(width: u32, height: u32, pixel: [u8; 4]) -> WorkingCanvas {
        WorkingCanvas::from_rgba(RgbaImage::from_pixel(width, height, Rgba(pixel))).unwrap()
    }

    #[test]
    fn test_stride() {
        assert_eq!(sample_stride(100, 1000), 1);
        assert_eq!(sample_stride(1000, 1000), 1);
        assert_eq!(sample_stride(1001, 1000), 2);
        assert_eq!(sample_stride(10_000, 3), 3334);
        assert_eq!(sample_stride(10, 0), 10);
    }

    #[test]
    fn test_sample_count_is_bounded() {
        let canvas = canvas(100, 100, [1, 2, 3, 255]);
        let samples = sample(&canvas, &SampleOptions { max_samples: 3000, ..options() });
        // stride 4 over 10000 pixels
        assert_eq!(samples.len(), 2500);
        assert!(samples.iter().all(|s| *s == [1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_transparent_and_faint_pixels_are_skipped() {
        let mut image = RgbaImage::from_pixel(4, 1, Rgba([10, 20, 30, 255]));
        image.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        image.put_pixel(1, 0, Rgba([10, 20, 30, 15]));
        image.put_pixel(2, 0, Rgba([10, 20, 30, 16]));
        let canvas = WorkingCanvas::from_rgba(image).unwrap();

        let samples = sample(&canvas, &SampleOptions { composite: false, ..options() });
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn test_zero_threshold_still_drops_fully_transparent() {
        let canvas = canvas(3, 3, [5, 5, 5, 0]);
        let samples = sample(&canvas, &SampleOptions { alpha_threshold: 0, ..options() });
        assert!(samples.is_empty());
    }

    #[test]
    fn test_translucent_pixels_composite_onto_background() {
        let canvas = canvas(1, 1, [0, 0, 0, 51]);
        let samples = sample(&canvas, &options());
        // ratio 0.2: 0 * 0.2 + 255 * 0.8
        assert_eq!(samples.len(), 1);
        for channel in samples[0] {
            assert!((channel - 204.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_translucent_pixels_kept_raw_without_composite() {
        let canvas = canvas(1, 1, [0, 0, 0, 51]);
        let samples = sample(&canvas, &SampleOptions { composite: false, ..options() });
        assert_eq!(samples, vec![[0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_opaque_pixels_ignore_background() {
        let canvas = canvas(2, 2, [9, 8, 7, 255]);
        let samples = sample(&canvas, &SampleOptions { background: [0, 0, 0], ..options() });
        assert!(samples.iter().all(|s| *s == [9.0, 8.0, 7.0]));
    }
}
