//! Palette construction from k-means output.
//!
//! Clusters become user-facing swatches here: counted, filtered by size, sorted
//! by coverage and folded together when two of them would print as the same ink.

use palette::Srgb;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kmeans::distance_sq;

/// One retained ink color with its share of the sampled artwork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub rgb: [u8; 3],
    /// Upper-case `#RRGGBB`.
    pub hex: String,
    pub pixel_count: u64,
    /// `pixel_count / total_pixels * 100`, in `[0, 100]`.
    pub percent: f64,
}

impl PaletteEntry {
    pub fn new(rgb: [u8; 3], pixel_count: u64, total_pixels: usize) -> Self {
        Self {
            rgb,
            hex: to_hex(rgb),
            pixel_count,
            percent: percent_of(pixel_count, total_pixels),
        }
    }

    pub fn color(&self) -> Srgb<u8> {
        Srgb::new(self.rgb[0], self.rgb[1], self.rgb[2])
    }

    fn point(&self) -> [f64; 3] {
        self.rgb.map(f64::from)
    }
}

pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

/// Parses `#rrggbb` or `#rgb`, with or without the leading `#`.
pub fn parse_hex(input: &str) -> Option<[u8; 3]> {
    let color: Srgb<u8> = input.trim().parse().ok()?;
    Some([color.red, color.green, color.blue])
}

pub fn percent_of(count: u64, total_pixels: usize) -> f64 {
    if total_pixels == 0 {
        return 0.0;
    }
    count as f64 / total_pixels as f64 * 100.0
}

fn round_rgb(point: [f64; 3]) -> [u8; 3] {
    point.map(|c| c.round().clamp(0.0, 255.0) as u8)
}

fn sort_by_coverage(entries: &mut [PaletteEntry]) {
    // Stable: equal shares keep their incoming order.
    entries.sort_by(|a, b| b.percent.total_cmp(&a.percent));
}

/// Turns cluster centroids and per-sample assignments into a palette.
///
/// An entry survives only if it reaches both `min_pixels` and `min_pct`.
/// Entries come back sorted by descending share.
pub fn build_palette(
    centroids: &[[f64; 3]],
    assignments: &[usize],
    total_pixels: usize,
    min_pct: f64,
    min_pixels: u64,
) -> Vec<PaletteEntry> {
    let mut counts = vec![0u64; centroids.len()];
    for &cluster in assignments {
        if let Some(count) = counts.get_mut(cluster) {
            *count += 1;
        }
    }

    let mut entries: Vec<PaletteEntry> = centroids
        .iter()
        .zip(&counts)
        .map(|(&centroid, &count)| PaletteEntry::new(round_rgb(centroid), count, total_pixels))
        .filter(|entry| entry.pixel_count >= min_pixels && entry.percent >= min_pct)
        .collect();

    sort_by_coverage(&mut entries);

    debug!(
        "Palette built: {} of {} clusters kept (min_pct={}, min_pixels={})",
        entries.len(),
        centroids.len(),
        min_pct,
        min_pixels
    );
    entries
}

struct MergedInk {
    point: [f64; 3],
    count: u64,
}

/// One first-match pass: each entry folds into the first already-kept ink closer
/// than `threshold`, weighted by pixel count.
fn merge_pass(palette: &[PaletteEntry], total_pixels: usize, threshold: f64) -> Vec<PaletteEntry> {
    let threshold_sq = threshold * threshold;
    let mut merged: Vec<MergedInk> = Vec::with_capacity(palette.len());

    for entry in palette {
        let point = entry.point();
        let target = merged
            .iter_mut()
            .find(|ink| threshold > 0.0 && distance_sq(ink.point, point) < threshold_sq);

        match target {
            Some(ink) => {
                let combined = ink.count + entry.pixel_count;
                if combined > 0 {
                    let (a, b) = (ink.count as f64, entry.pixel_count as f64);
                    for c in 0..3 {
                        ink.point[c] = (ink.point[c] * a + point[c] * b) / combined as f64;
                    }
                }
                ink.count = combined;
            }
            None => merged.push(MergedInk {
                point,
                count: entry.pixel_count,
            }),
        }
    }

    let mut entries: Vec<PaletteEntry> = merged
        .into_iter()
        .map(|ink| PaletteEntry::new(round_rgb(ink.point), ink.count, total_pixels))
        .collect();
    sort_by_coverage(&mut entries);
    entries
}

/// Collapses entries that would print as the same ink.
///
/// Merging is first-match in the palette's sorted order, not nearest-match, so
/// the outcome depends on that order. Passes repeat until one merges nothing,
/// which leaves no two entries within `threshold` of each other and makes the
/// function idempotent.
pub fn merge_by_distance(
    palette: &[PaletteEntry],
    total_pixels: usize,
    threshold: f64,
) -> Vec<PaletteEntry> {
    let mut current = merge_pass(palette, total_pixels, threshold);
    loop {
        let next = merge_pass(&current, total_pixels, threshold);
        if next.len() == current.len() {
            debug!("Merged palette: {} -> {} entries", palette.len(), current.len());
            return current;
        }
        current = next;
    }
}
