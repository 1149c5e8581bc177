//! Process-wide effect settings applied uniformly at render time.
//!
//! An [`EffectSpec`] has three independent parts:
//!
//! - a named [`FilterPreset`], each mapping to a CSS filter expression
//! - an [`Adjustments`] vector of zero-centered sliders
//! - an [`OverlaySpec`] describing watermark, border and signature
//!
//! The filter preset and the adjustments are combined into a single filter
//! expression by [`EffectSpec::filter_expression`] and parsed by
//! [`crate::imaging::filters`]. Sharpening has no CSS counterpart and is
//! carried separately as an unsharp mask.
//!
//! Everything here is `serde` serializable: the whole spec is what the
//! settings slot persists and what history entries snapshot.

use crate::imaging::Sharpening;
use crate::imaging::filters::{FilterError, FilterOp, parse_filter};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EffectsError {
    #[error("invalid color '{0}': expected #rrggbb or #rrggbbaa")]
    InvalidColor(String),
}

// ============================================================================
// Filter presets
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterPreset {
    #[default]
    None,
    Sepia,
    Grayscale,
    Vintage,
    Cool,
    Warm,
    HighContrast,
    Soft,
    Sharp,
    Dramatic,
    Moonlight,
    Sunrise,
}

impl FilterPreset {
    pub const ALL: [FilterPreset; 12] = [
        FilterPreset::None,
        FilterPreset::Sepia,
        FilterPreset::Grayscale,
        FilterPreset::Vintage,
        FilterPreset::Cool,
        FilterPreset::Warm,
        FilterPreset::HighContrast,
        FilterPreset::Soft,
        FilterPreset::Sharp,
        FilterPreset::Dramatic,
        FilterPreset::Moonlight,
        FilterPreset::Sunrise,
    ];

    /// Display name.
    pub fn label(self) -> &'static str {
        match self {
            FilterPreset::None => "None",
            FilterPreset::Sepia => "Sepia",
            FilterPreset::Grayscale => "Grayscale",
            FilterPreset::Vintage => "Vintage",
            FilterPreset::Cool => "Cool",
            FilterPreset::Warm => "Warm",
            FilterPreset::HighContrast => "High Contrast",
            FilterPreset::Soft => "Soft",
            FilterPreset::Sharp => "Sharp",
            FilterPreset::Dramatic => "Dramatic",
            FilterPreset::Moonlight => "Moonlight",
            FilterPreset::Sunrise => "Sunrise",
        }
    }

    /// CSS filter expression for the preset.
    pub fn css(self) -> &'static str {
        match self {
            FilterPreset::None => "none",
            FilterPreset::Sepia => "sepia(100%)",
            FilterPreset::Grayscale => "grayscale(100%)",
            FilterPreset::Vintage => "sepia(50%) contrast(1.2) brightness(0.8)",
            FilterPreset::Cool => "hue-rotate(180deg) saturate(1.5)",
            FilterPreset::Warm => "hue-rotate(-20deg) saturate(1.2) brightness(1.1)",
            FilterPreset::HighContrast => "contrast(1.5) brightness(1.1)",
            FilterPreset::Soft => "blur(0.5px) brightness(1.1)",
            FilterPreset::Sharp => "contrast(1.3) brightness(1.05) saturate(1.1)",
            FilterPreset::Dramatic => "contrast(1.8) brightness(0.9) saturate(0.8)",
            FilterPreset::Moonlight => "hue-rotate(200deg) saturate(0.6) brightness(0.7)",
            FilterPreset::Sunrise => "hue-rotate(-10deg) saturate(1.4) brightness(1.2)",
        }
    }

    /// Look a preset up by its display name (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(label.trim()))
    }
}

// ============================================================================
// Adjustments
// ============================================================================

/// Slider values. Zero everywhere is the identity.
///
/// | Field | Range | Maps to |
/// |---|---|---|
/// | brightness | -100..=100 | `brightness(1 + v/100)` |
/// | contrast | -100..=100 | `contrast(1 + v/100)` |
/// | saturation | -100..=100 | `saturate(1 + v/100)` |
/// | hue | -180..=180 | `hue-rotate(v deg)` |
/// | blur | 0..=20 | `blur(v px)` |
/// | sharpen | 0..=100 | unsharp mask |
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adjustments {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub hue: f64,
    pub blur: f64,
    pub sharpen: f64,
}

impl Adjustments {
    /// Copy with every slider clamped to its range. Non-finite values reset to 0.
    pub fn clamped(self) -> Self {
        let c = |v: f64, lo: f64, hi: f64| if v.is_finite() { v.clamp(lo, hi) } else { 0.0 };
        Self {
            brightness: c(self.brightness, -100.0, 100.0),
            contrast: c(self.contrast, -100.0, 100.0),
            saturation: c(self.saturation, -100.0, 100.0),
            hue: c(self.hue, -180.0, 180.0),
            blur: c(self.blur, 0.0, 20.0),
            sharpen: c(self.sharpen, 0.0, 100.0),
        }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// CSS functions for the non-zero sliders, in a fixed order.
    fn css_terms(&self) -> Vec<String> {
        let a = self.clamped();
        let mut terms = Vec::new();
        if a.brightness != 0.0 {
            terms.push(format!("brightness({})", 1.0 + a.brightness / 100.0));
        }
        if a.contrast != 0.0 {
            terms.push(format!("contrast({})", 1.0 + a.contrast / 100.0));
        }
        if a.saturation != 0.0 {
            terms.push(format!("saturate({})", 1.0 + a.saturation / 100.0));
        }
        if a.hue != 0.0 {
            terms.push(format!("hue-rotate({}deg)", a.hue));
        }
        if a.blur != 0.0 {
            terms.push(format!("blur({}px)", a.blur));
        }
        terms
    }
}

// ============================================================================
// Overlays
// ============================================================================

/// RGBA color, serialized as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn parse(s: &str) -> Result<Self, EffectsError> {
        let invalid = || EffectsError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 255 },
        })
    }

    /// Pixel value with the alpha channel multiplied by `opacity`.
    pub fn to_rgba(self, opacity: f32) -> image::Rgba<u8> {
        let alpha = (self.a as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
        image::Rgba([self.r, self.g, self.b, alpha])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = EffectsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Color::parse(&s)
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_string()
    }
}

/// Text drawn over the rendered crop. Sizes are in logical pixels and get
/// multiplied by the oversampling ratio at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOverlay {
    pub enabled: bool,
    pub text: String,
    pub color: Color,
    pub size: f32,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderOverlay {
    pub enabled: bool,
    pub color: Color,
    pub width: f32,
}

impl Default for BorderOverlay {
    fn default() -> Self {
        Self {
            enabled: false,
            color: Color::BLACK,
            width: 4.0,
        }
    }
}

/// Drawn in fixed order: watermark, border, signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySpec {
    pub watermark: TextOverlay,
    pub border: BorderOverlay,
    pub signature: TextOverlay,
}

impl Default for OverlaySpec {
    fn default() -> Self {
        Self {
            watermark: TextOverlay {
                enabled: false,
                text: "Watermark".into(),
                color: Color::WHITE,
                size: 24.0,
                opacity: 0.5,
            },
            border: BorderOverlay::default(),
            signature: TextOverlay {
                enabled: false,
                text: "Signature".into(),
                color: Color::BLACK,
                size: 28.0,
                opacity: 1.0,
            },
        }
    }
}

impl Default for TextOverlay {
    fn default() -> Self {
        OverlaySpec::default().watermark
    }
}

impl OverlaySpec {
    pub fn any_enabled(&self) -> bool {
        self.watermark.enabled || self.border.enabled || self.signature.enabled
    }
}

// ============================================================================
// Effect spec
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSpec {
    pub filter: FilterPreset,
    pub adjustments: Adjustments,
    pub overlays: OverlaySpec,
}

impl EffectSpec {
    /// Preset expression followed by the adjustment terms. `none` when neither
    /// contributes.
    pub fn filter_expression(&self) -> String {
        let mut terms = Vec::new();
        if self.filter != FilterPreset::None {
            terms.push(self.filter.css().to_string());
        }
        terms.extend(self.adjustments.css_terms());
        if terms.is_empty() {
            "none".to_string()
        } else {
            terms.join(" ")
        }
    }

    /// Parsed filter pipeline.
    pub fn filter_ops(&self) -> Result<Vec<FilterOp>, FilterError> {
        parse_filter(&self.filter_expression())
    }

    pub fn sharpening(&self) -> Option<Sharpening> {
        Sharpening::from_amount(self.adjustments.clamped().sharpen)
    }

    /// Reset the sliders, keep preset and overlays.
    pub fn reset_adjustments(&mut self) {
        self.adjustments = Adjustments::default();
    }
}
