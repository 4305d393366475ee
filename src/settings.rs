//! Analysis settings snapshot.
//!
//! A [`Settings`] value is immutable for the duration of one analysis run and is
//! stored next to the results so the run can be reproduced. Values coming from
//! the storefront are best-effort user input: they are clamped, never rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::swatch::parse_hex;

/// Upper bound on the number of ink colors a design can be quantized to.
pub const MAX_COLORS: usize = 8;

/// Length of the RGB cube diagonal, the largest meaningful merge distance.
pub const MAX_RGB_DISTANCE: f64 = 442.0;

const MIN_DIM: u32 = 16;
const MAX_DIM: u32 = 8192;
const MAX_SAMPLES: usize = 1_000_000;
const MAX_PIXEL_RATIO: f32 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of k-means clusters, in `1..=MAX_COLORS`.
    pub color_count: usize,
    /// Minimum share of sampled pixels (0-100) a cluster needs to become a palette entry.
    pub min_pct: f64,
    /// Minimum number of sampled pixels a cluster needs to become a palette entry.
    pub min_pixels: u64,
    /// Pixels with an alpha below this value are not part of the artwork.
    pub alpha_threshold: u8,
    /// Garment color translucent pixels are blended onto when `composite` is set.
    pub background: [u8; 3],
    pub composite: bool,
    pub max_working_dim: u32,
    pub max_preview_dim: u32,
    pub max_samples: usize,
    pub seed: u32,
    /// RGB distance below which two palette entries count as the same ink.
    pub merge_distance: f64,
    /// Display pixel ratio; vector art smaller than the working size is upscaled by it.
    pub pixel_ratio: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color_count: 6,
            min_pct: 1.0,
            min_pixels: 10,
            alpha_threshold: 16,
            background: [255, 255, 255],
            composite: true,
            max_working_dim: 800,
            max_preview_dim: 600,
            max_samples: 40_000,
            seed: 1337,
            merge_distance: 24.0,
            pixel_ratio: 1.0,
        }
    }
}

impl Settings {
    /// Returns a copy with every field forced into its documented range.
    pub fn clamped(&self) -> Settings {
        let defaults = Settings::default();
        Settings {
            color_count: self.color_count.clamp(1, MAX_COLORS),
            min_pct: finite_or(self.min_pct, defaults.min_pct).clamp(0.0, 100.0),
            min_pixels: self.min_pixels,
            alpha_threshold: self.alpha_threshold,
            background: self.background,
            composite: self.composite,
            max_working_dim: self.max_working_dim.clamp(MIN_DIM, MAX_DIM),
            max_preview_dim: self.max_preview_dim.clamp(MIN_DIM, MAX_DIM),
            max_samples: self.max_samples.clamp(1, MAX_SAMPLES),
            seed: self.seed,
            merge_distance: finite_or(self.merge_distance, defaults.merge_distance)
                .clamp(0.0, MAX_RGB_DISTANCE),
            pixel_ratio: if self.pixel_ratio.is_finite() {
                self.pixel_ratio.clamp(1.0, MAX_PIXEL_RATIO)
            } else {
                defaults.pixel_ratio
            },
        }
    }

    /// Builds settings from untrusted JSON.
    ///
    /// Both `snake_case` and `camelCase` keys are accepted. Numbers may arrive as
    /// JSON numbers or numeric strings, flags as booleans, `0`/`1` or words like
    /// `"yes"`. A missing or malformed field keeps its default, and the result is
    /// always clamped.
    pub fn from_json_value(value: &Value) -> Settings {
        let defaults = Settings::default();
        let Some(obj) = value.as_object() else {
            return defaults;
        };

        let number = |keys: &[&str]| lookup(obj, keys).and_then(lenient_f64);
        let integer = |keys: &[&str], lo: f64, hi: f64| number(keys).map(|v| v.round().clamp(lo, hi));

        let settings = Settings {
            color_count: integer(&["color_count", "colorCount"], 1.0, MAX_COLORS as f64)
                .map(|v| v as usize)
                .unwrap_or(defaults.color_count),
            min_pct: number(&["min_pct", "minPct"]).unwrap_or(defaults.min_pct),
            min_pixels: integer(&["min_pixels", "minPixels"], 0.0, u32::MAX as f64)
                .map(|v| v as u64)
                .unwrap_or(defaults.min_pixels),
            alpha_threshold: integer(&["alpha_threshold", "alphaThreshold"], 0.0, 255.0)
                .map(|v| v as u8)
                .unwrap_or(defaults.alpha_threshold),
            background: lookup(obj, &["background", "backgroundRgb", "background_rgb"])
                .and_then(lenient_rgb)
                .unwrap_or(defaults.background),
            composite: lookup(obj, &["composite", "compositeOnBackground"])
                .and_then(lenient_bool)
                .unwrap_or(defaults.composite),
            max_working_dim: integer(&["max_working_dim", "maxWorkingDim"], 0.0, MAX_DIM as f64)
                .map(|v| v as u32)
                .unwrap_or(defaults.max_working_dim),
            max_preview_dim: integer(&["max_preview_dim", "maxPreviewDim"], 0.0, MAX_DIM as f64)
                .map(|v| v as u32)
                .unwrap_or(defaults.max_preview_dim),
            max_samples: integer(&["max_samples", "maxSamples"], 0.0, MAX_SAMPLES as f64)
                .map(|v| v as usize)
                .unwrap_or(defaults.max_samples),
            seed: integer(&["seed"], 0.0, u32::MAX as f64)
                .map(|v| v as u32)
                .unwrap_or(defaults.seed),
            merge_distance: number(&["merge_distance", "mergeDistance"])
                .unwrap_or(defaults.merge_distance),
            pixel_ratio: number(&["pixel_ratio", "pixelRatio", "devicePixelRatio"])
                .map(|v| v as f32)
                .unwrap_or(defaults.pixel_ratio),
        };

        settings.clamped()
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn lenient_rgb(value: &Value) -> Option<[u8; 3]> {
    match value {
        Value::String(s) => parse_hex(s),
        Value::Array(items) if items.len() == 3 => {
            let mut rgb = [0u8; 3];
            for (slot, item) in rgb.iter_mut().zip(items) {
                *slot = lenient_f64(item)?.round().clamp(0.0, 255.0) as u8;
            }
            Some(rgb)
        }
        _ => None,
    }
}
