//! Payload handed to the cart/order persistence layer.
//!
//! The storefront posts `estimated_colors`, `palette` and `settings` as form
//! fields, with the latter two JSON-encoded. Whatever comes back from a client
//! is sanitized before it is stored: entries are capped, malformed values
//! dropped or defaulted, numeric fields clamped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::pipeline::Analysis;
use crate::settings::{Settings, lenient_f64, lenient_rgb};
use crate::swatch::{PaletteEntry, parse_hex, to_hex};

/// Maximum palette entries accepted from a client.
pub const MAX_PAYLOAD_ENTRIES: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignPayload {
    pub estimated_colors: usize,
    pub palette: Vec<PaletteEntry>,
    pub settings: Settings,
}

impl DesignPayload {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        Self {
            estimated_colors: analysis.estimated_color_count,
            palette: analysis.palette.clone(),
            settings: analysis.settings.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The three form fields the storefront posts, palette and settings as JSON text.
    pub fn form_fields(&self) -> serde_json::Result<[(&'static str, String); 3]> {
        Ok([
            ("estimated_colors", self.estimated_colors.to_string()),
            ("palette", serde_json::to_string(&self.palette)?),
            ("settings", serde_json::to_string(&self.settings)?),
        ])
    }

    /// Rebuilds a payload from untrusted JSON.
    ///
    /// `palette` and `settings` may be nested values or JSON-encoded strings.
    /// A missing `estimated_colors` falls back to the number of kept entries.
    pub fn sanitize(value: &Value) -> Self {
        let palette = value
            .get("palette")
            .map(sanitize_palette)
            .unwrap_or_default();

        let settings = value
            .get("settings")
            .map(|raw| Settings::from_json_value(&decode_nested(raw)))
            .unwrap_or_default();

        let estimated_colors = value
            .get("estimated_colors")
            .and_then(lenient_f64)
            .map(|v| v.round().clamp(0.0, MAX_PAYLOAD_ENTRIES as f64) as usize)
            .unwrap_or(palette.len());

        Self {
            estimated_colors,
            palette,
            settings,
        }
    }

    /// Like [`DesignPayload::sanitize`], starting from text. Unparsable text
    /// yields an empty payload with default settings.
    pub fn sanitize_str(json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => Self::sanitize(&value),
            Err(e) => {
                debug!("Discarding unparsable payload: {}", e);
                Self::sanitize(&Value::Null)
            }
        }
    }
}

fn decode_nested(value: &Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(text).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Keeps at most [`MAX_PAYLOAD_ENTRIES`] well-formed entries, in order.
pub fn sanitize_palette(value: &Value) -> Vec<PaletteEntry> {
    let decoded = decode_nested(value);
    let Some(items) = decoded.as_array() else {
        return Vec::new();
    };

    let palette: Vec<PaletteEntry> = items
        .iter()
        .filter_map(sanitize_entry)
        .take(MAX_PAYLOAD_ENTRIES)
        .collect();

    if palette.len() < items.len() {
        debug!("Sanitized palette: kept {} of {} entries", palette.len(), items.len());
    }
    palette
}

fn sanitize_entry(value: &Value) -> Option<PaletteEntry> {
    let obj = value.as_object()?;
    let rgb = obj
        .get("hex")
        .and_then(Value::as_str)
        .and_then(parse_hex)
        .or_else(|| obj.get("rgb").and_then(lenient_rgb))?;

    let pixel_count = obj
        .get("pixel_count")
        .or_else(|| obj.get("pixelCount"))
        .and_then(lenient_f64)
        .map(|v| v.round().clamp(0.0, u32::MAX as f64) as u64)
        .unwrap_or(0);

    let percent = obj
        .get("percent")
        .and_then(lenient_f64)
        .map(|v| v.clamp(0.0, 100.0))
        .unwrap_or(0.0);

    Some(PaletteEntry {
        rgb,
        hex: to_hex(rgb),
        pixel_count,
        percent,
    })
}
