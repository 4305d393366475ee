//! Browser bindings for the storefront designer.
//!
//! Results are handed to JavaScript as plain objects:
//! `{ estimatedColorCount, palette: [{ hex, rgb, pixelCount, percent }], preview, payload }`
//! where `preview` is a PNG data URL or `null`, and `payload` is the JSON
//! destined for cart/order metadata.

use js_sys::{Array, Object, Reflect};
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::payload::{DesignPayload, sanitize_palette};
use crate::pipeline::{Analysis, analyze_or_empty, recompute};
use crate::preview::render_recolored_preview;
use crate::raster::{WorkingCanvas, rasterize_bytes};
use crate::sequence::{LatestRun, RunTicket};
use crate::settings::Settings;
use crate::swatch::{PaletteEntry, parse_hex};

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn parse_settings(settings_json: Option<String>) -> Settings {
    settings_json
        .and_then(|json| serde_json::from_str::<Value>(&json).ok())
        .map(|value| Settings::from_json_value(&value))
        .unwrap_or_default()
}

fn set(target: &Object, key: &str, value: &JsValue) -> Result<(), JsValue> {
    Reflect::set(target, &JsValue::from_str(key), value)?;
    Ok(())
}

fn palette_to_js(palette: &[PaletteEntry]) -> Result<Array, JsValue> {
    let list = Array::new();
    for entry in palette {
        let rgb = Array::new();
        for channel in entry.rgb {
            rgb.push(&JsValue::from(channel));
        }

        let swatch = Object::new();
        set(&swatch, "hex", &JsValue::from_str(&entry.hex))?;
        set(&swatch, "rgb", &rgb)?;
        set(&swatch, "pixelCount", &JsValue::from_f64(entry.pixel_count as f64))?;
        set(&swatch, "percent", &JsValue::from_f64(entry.percent))?;
        list.push(&swatch);
    }
    Ok(list)
}

fn analysis_to_js(analysis: &Analysis) -> Result<Object, JsValue> {
    let preview = match &analysis.preview {
        Some(preview) => JsValue::from_str(&preview.to_data_url().map_err(js_err)?),
        None => JsValue::NULL,
    };
    let payload = analysis.payload().to_json().map_err(js_err)?;

    let result = Object::new();
    set(
        &result,
        "estimatedColorCount",
        &JsValue::from_f64(analysis.estimated_color_count as f64),
    )?;
    let palette = palette_to_js(&analysis.palette)?;
    set(&result, "palette", &palette)?;
    set(&result, "preview", &preview)?;
    set(&result, "payload", &JsValue::from_str(&payload))?;
    Ok(result)
}

/// One-shot analysis of an uploaded file. An undecodable file produces the
/// empty result rather than an exception.
#[wasm_bindgen]
pub fn analyze_design(input: Vec<u8>, settings_json: Option<String>) -> Result<Object, JsValue> {
    let settings = parse_settings(settings_json);
    let analysis = analyze_or_empty(&input, &settings);
    analysis_to_js(&analysis)
}

/// Cleans a client-supplied payload before it is stored with a cart item.
#[wasm_bindgen]
pub fn sanitize_payload(json: &str) -> Result<String, JsValue> {
    DesignPayload::sanitize_str(json).to_json().map_err(js_err)
}

/// The working canvas of the current upload, held by the page so settings
/// changes and swatch edits don't need to decode the file again.
///
/// A change of `max_working_dim` or `pixel_ratio` needs a new canvas.
#[wasm_bindgen]
pub struct DesignCanvas {
    canvas: WorkingCanvas,
}

#[wasm_bindgen]
impl DesignCanvas {
    #[wasm_bindgen(constructor)]
    pub fn new(input: &[u8], settings_json: Option<String>) -> Result<DesignCanvas, JsValue> {
        let settings = parse_settings(settings_json);
        let canvas = rasterize_bytes(input, settings.max_working_dim, settings.pixel_ratio)
            .map_err(js_err)?;
        Ok(DesignCanvas { canvas })
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn analyze(&self, settings_json: Option<String>) -> Result<Object, JsValue> {
        let settings = parse_settings(settings_json);
        analysis_to_js(&recompute(&settings, &self.canvas))
    }

    /// Re-renders the preview with hand-edited swatches. `paint` holds one hex
    /// string per palette entry; blank or invalid slots keep the original ink.
    /// Returns a data URL, or `null` for an empty palette.
    pub fn recolor(
        &self,
        palette_json: &str,
        paint: Array,
        settings_json: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let settings = parse_settings(settings_json).clamped();
        let palette_value: Value = serde_json::from_str(palette_json).map_err(js_err)?;
        let palette = sanitize_palette(&palette_value);

        let inks: Vec<[u8; 3]> = palette
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                paint
                    .get(idx as u32)
                    .as_string()
                    .and_then(|hex| parse_hex(&hex))
                    .unwrap_or(entry.rgb)
            })
            .collect();

        match render_recolored_preview(&self.canvas, &palette, &inks, &settings) {
            Some(preview) => Ok(JsValue::from_str(&preview.to_data_url().map_err(js_err)?)),
            None => Ok(JsValue::NULL),
        }
    }
}

/// Lets the page drop results of analyses that a newer one has superseded.
#[wasm_bindgen]
#[derive(Default)]
pub struct RunSequencer {
    runs: LatestRun,
}

#[wasm_bindgen]
impl RunSequencer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> RunSequencer {
        RunSequencer::default()
    }

    pub fn begin(&self) -> f64 {
        self.runs.begin().id() as f64
    }

    #[wasm_bindgen(js_name = isCurrent)]
    pub fn is_current(&self, ticket: f64) -> bool {
        self.runs.is_current(RunTicket::from_id(ticket as u64))
    }
}
