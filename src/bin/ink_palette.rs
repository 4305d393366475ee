use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use ink_palette_wasm::logger::{self, info, warn};
use ink_palette_wasm::{Analysis, Settings, analyze_file, parse_hex};
use anyhow::{Context, Result, anyhow};

/// Estimate how many ink colors a print design needs.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more design files (PNG, JPEG, WebP, GIF, SVG, ...)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON settings file; flags below override its values
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Number of k-means clusters (1-8)
    #[arg(short = 'k', long)]
    colors: Option<usize>,

    /// Minimum share (percent) for a color to count as an ink
    #[arg(long)]
    min_pct: Option<f64>,

    /// Minimum sampled pixels for a color to count as an ink
    #[arg(long)]
    min_pixels: Option<u64>,

    /// Pixels below this alpha (0-255) are ignored
    #[arg(short, long)]
    alpha_threshold: Option<u8>,

    /// Garment color translucent pixels are blended onto, e.g. "#ffffff"
    #[arg(short, long)]
    background: Option<String>,

    /// Keep translucent pixels as-is instead of blending them onto the background
    #[arg(long)]
    no_composite: bool,

    /// Longest side of the working canvas
    #[arg(long)]
    max_dim: Option<u32>,

    /// Longest side of the preview image
    #[arg(long)]
    preview_dim: Option<u32>,

    /// RGB distance under which two colors count as one ink
    #[arg(short, long)]
    merge_distance: Option<f64>,

    /// Seed for k-means initialisation
    #[arg(short, long)]
    seed: Option<u32>,

    /// Write `<stem>.preview.png` and `<stem>.json` here
    #[arg(short = 'd', long)]
    out_dir: Option<PathBuf>,
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.settings {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading settings {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing settings {}", path.display()))?;
            Settings::from_json_value(&value)
        }
        None => Settings::default(),
    };

    if let Some(k) = args.colors { settings.color_count = k; }
    if let Some(v) = args.min_pct { settings.min_pct = v; }
    if let Some(v) = args.min_pixels { settings.min_pixels = v; }
    if let Some(v) = args.alpha_threshold { settings.alpha_threshold = v; }
    if let Some(v) = args.max_dim { settings.max_working_dim = v; }
    if let Some(v) = args.preview_dim { settings.max_preview_dim = v; }
    if let Some(v) = args.merge_distance { settings.merge_distance = v; }
    if let Some(v) = args.seed { settings.seed = v; }
    if args.no_composite { settings.composite = false; }
    if let Some(hex) = &args.background {
        settings.background = parse_hex(hex).ok_or_else(|| anyhow!("invalid background color {hex}"))?;
    }

    Ok(settings.clamped())
}

fn print_report(input: &Path, analysis: &Analysis) {
    println!("{}: {} ink color(s)", input.display(), analysis.estimated_color_count);
    for entry in &analysis.palette {
        println!("  {}  {:>6.2}%  {:>8} px", entry.hex, entry.percent, entry.pixel_count);
    }
}

fn write_outputs(dir: &Path, input: &Path, analysis: &Analysis) -> Result<()> {
    fs::create_dir_all(dir)?;
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();

    let json_path = dir.join(format!("{stem}.json"));
    fs::write(&json_path, analysis.payload().to_json()?)?;
    println!("Saved → {}", json_path.display());

    match &analysis.preview {
        Some(preview) => {
            let png_path = dir.join(format!("{stem}.preview.png"));
            fs::write(&png_path, preview.to_png()?)?;
            println!("Saved → {}", png_path.display());
        }
        None => warn!("No preview for {}: no usable color content", input.display()),
    }
    Ok(())
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::parse();
    let settings = load_settings(&args)?;
    info!("Analyzing {} file(s), k={}", args.inputs.len(), settings.color_count);

    for input in &args.inputs {
        let analysis = analyze_file(input, &settings)
            .with_context(|| format!("analyzing {}", input.display()))?;
        print_report(input, &analysis);

        if let Some(dir) = &args.out_dir {
            write_outputs(dir, input, &analysis)?;
        }
    }

    Ok(())
}
