//! Ink color estimation for custom print designs.
//!
//! An uploaded design (bitmap or SVG) is rasterized to a bounded working canvas,
//! sampled, clustered with a seeded k-means and reduced to a palette of
//! distinct inks with their coverage. A quantized preview shows the design as
//! it would print with those inks.
//!
//! Stages, in order: [`raster`], [`sample`], [`kmeans`], [`swatch`], [`preview`].
//! [`pipeline`] chains them; [`wasm`] exposes them to the storefront page.

pub mod error;
pub mod kmeans;
pub mod payload;
pub mod pipeline;
pub mod preview;
pub mod raster;
pub mod sample;
pub mod sequence;
pub mod settings;
pub mod swatch;
pub mod wasm;

#[cfg(feature = "native-bin")]
pub mod logger;

pub use error::{AnalysisError, Result};
pub use kmeans::{Clustering, XorShift32, cluster};
pub use payload::{DesignPayload, MAX_PAYLOAD_ENTRIES};
pub use pipeline::{Analysis, analyze_bytes, analyze_or_empty, recompute};
pub use preview::{Preview, render_preview, render_recolored_preview};
pub use raster::{RasterSource, SourceKind, WorkingCanvas, decode, rasterize, rasterize_bytes};
pub use sample::{Sample, SampleOptions, sample};
pub use sequence::{LatestRun, RunTicket};
pub use settings::{MAX_COLORS, Settings};
pub use swatch::{PaletteEntry, build_palette, merge_by_distance, parse_hex};

/// Reads and analyzes a design file from disk.
#[cfg(not(target_arch = "wasm32"))]
pub fn analyze_file<P: AsRef<std::path::Path>>(path: P, settings: &Settings) -> Result<Analysis> {
    let bytes = std::fs::read(path.as_ref())?;
    analyze_bytes(&bytes, settings)
}
