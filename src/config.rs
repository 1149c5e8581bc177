//! Crop and export configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! serialized to a TOML table and the user's file is merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [render]
//! device_pixel_ratio = 1.0  # Output density multiplier
//! min_pixel_ratio = 4.0     # Floor for the oversampling factor
//! preview_max_edge = 1024   # Longest displayed edge for loaded images
//!
//! [sync]
//! debounce_ms = 50          # Crop fan-out debounce window
//!
//! [session]
//! autosave_ms = 100         # Tab state autosave debounce window
//!
//! [pdf]
//! page_width_mm = 210.0
//! page_height_mm = 297.0
//! margin_mm = 10.0
//! jpeg_quality = 92
//!
//! [ocr]
//! language = "eng"
//! line_chars = 80
//! font_size_pt = 8.0
//! line_spacing_mm = 8.0
//! text_offset_mm = 10.0
//! # detection_model = "models/det.onnx"      # built-in recognizer, `ocr` feature
//! # recognition_model = "models/rec.onnx"
//! # dictionary = "models/dict.txt"
//!
//! [fonts]
//! # overlay = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
//! # signature = "/usr/share/fonts/truetype/dejavu/DejaVuSerif-Italic.ttf"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the config file looked up by [`load_config`].
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropConfig {
    pub render: RenderConfig,
    pub sync: SyncConfig,
    pub session: SessionConfig,
    pub pdf: PdfConfig,
    pub ocr: OcrConfig,
    pub fonts: FontConfig,
}

impl CropConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.render.device_pixel_ratio > 0.0) {
            return Err(ConfigError::Validation(
                "render.device_pixel_ratio must be positive".into(),
            ));
        }
        if !(self.render.min_pixel_ratio >= 1.0) {
            return Err(ConfigError::Validation(
                "render.min_pixel_ratio must be at least 1".into(),
            ));
        }
        if self.render.preview_max_edge == 0 {
            return Err(ConfigError::Validation(
                "render.preview_max_edge must be non-zero".into(),
            ));
        }
        if self.sync.debounce_ms == 0 || self.session.autosave_ms == 0 {
            return Err(ConfigError::Validation(
                "debounce windows must be non-zero".into(),
            ));
        }
        let pdf = &self.pdf;
        if !(pdf.page_width_mm > 0.0 && pdf.page_height_mm > 0.0) {
            return Err(ConfigError::Validation(
                "pdf page size must be positive".into(),
            ));
        }
        if !(pdf.margin_mm >= 0.0
            && pdf.margin_mm * 2.0 < pdf.page_width_mm
            && pdf.margin_mm * 2.0 < pdf.page_height_mm)
        {
            return Err(ConfigError::Validation(
                "pdf.margin_mm must leave room for content".into(),
            ));
        }
        if pdf.jpeg_quality == 0 || pdf.jpeg_quality > 100 {
            return Err(ConfigError::Validation(
                "pdf.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.ocr.line_chars == 0 {
            return Err(ConfigError::Validation(
                "ocr.line_chars must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Output surface settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Pixel density of the target display. Doubled for oversampling.
    pub device_pixel_ratio: f64,
    /// Lower bound for the oversampling factor.
    pub min_pixel_ratio: f64,
    /// Longest displayed edge of a loaded image. Larger rasters are shown
    /// scaled down; crops are then scaled back up at render time.
    pub preview_max_edge: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            min_pixel_ratio: 4.0,
            preview_max_edge: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { debounce_ms: 50 }
    }
}

impl SyncConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub autosave_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { autosave_ms: 100 }
    }
}

impl SessionConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.autosave_ms)
    }
}

/// PDF page layout. Lengths are millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PdfConfig {
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub margin_mm: f64,
    /// JPEG quality for embedded page images.
    pub jpeg_quality: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            page_width_mm: 210.0,
            page_height_mm: 297.0,
            margin_mm: 10.0,
            jpeg_quality: 92,
        }
    }
}

/// OCR text layer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrConfig {
    /// Language hint handed to the recognizer.
    pub language: String,
    /// Hard wrap budget per text line.
    pub line_chars: usize,
    pub font_size_pt: f64,
    pub line_spacing_mm: f64,
    /// Distance from the image top edge to the first line.
    pub text_offset_mm: f64,
    /// ONNX text detection model for the built-in recognizer. The
    /// recognizer is only built when all three model paths are set.
    pub detection_model: Option<PathBuf>,
    pub recognition_model: Option<PathBuf>,
    /// Character dictionary matching `recognition_model`.
    pub dictionary: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            line_chars: 80,
            font_size_pt: 8.0,
            line_spacing_mm: 8.0,
            text_offset_mm: 10.0,
            detection_model: None,
            recognition_model: None,
            dictionary: None,
        }
    }
}

/// Fonts for watermark and signature overlays. Without a font, text
/// overlays are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    pub overlay: Option<PathBuf>,
    /// Falls back to `overlay` when unset.
    pub signature: Option<PathBuf>,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(CropConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CropConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CropConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory, on top of the
/// stock defaults.
pub fn load_config(dir: &Path) -> Result<CropConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys.
pub fn stock_config_toml() -> &'static str {
    r##"# cropbatch configuration
# ======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
# Pixel density of the target display. The oversampling factor is
# max(device_pixel_ratio * 2, min_pixel_ratio).
device_pixel_ratio = 1.0
min_pixel_ratio = 4.0

# Loaded images are displayed with their longest edge capped at this size.
# Crop rectangles are expressed in displayed pixels.
preview_max_edge = 1024

# ---------------------------------------------------------------------------
# Crop synchronization (lock movement)
# ---------------------------------------------------------------------------
[sync]
# Rapid crop edits within this window collapse into one fan-out.
debounce_ms = 50

# ---------------------------------------------------------------------------
# Session
# ---------------------------------------------------------------------------
[session]
# Edits are committed to the tab list after this quiet period.
autosave_ms = 100

# ---------------------------------------------------------------------------
# PDF export
# ---------------------------------------------------------------------------
[pdf]
page_width_mm = 210.0
page_height_mm = 297.0
margin_mm = 10.0
# Embedded page images are JPEG at this quality (1-100).
jpeg_quality = 92

# ---------------------------------------------------------------------------
# OCR text layer (PDF only)
# ---------------------------------------------------------------------------
[ocr]
language = "eng"
# Recognized text is hard-wrapped at this many characters per line.
line_chars = 80
font_size_pt = 8.0
line_spacing_mm = 8.0
text_offset_mm = 10.0
# Models for the built-in recognizer (needs the `ocr` feature). Without all
# three, PDFs are exported without a text layer unless a recognizer is
# installed by hand.
# detection_model = "models/det.onnx"
# recognition_model = "models/rec.onnx"
# dictionary = "models/dict.txt"

# ---------------------------------------------------------------------------
# Overlay fonts
# ---------------------------------------------------------------------------
[fonts]
# TrueType/OpenType font for watermark text. When neither font is set, a
# system font is used; with no font at all, text overlays are skipped
# (borders are still drawn).
# overlay = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
# Font for signatures; defaults to the overlay font.
# signature = "/usr/share/fonts/truetype/dejavu/DejaVuSerif-Italic.ttf"
"##
}
