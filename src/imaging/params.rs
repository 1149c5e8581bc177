//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Sharpening`]: Unsharp-mask parameters (sigma + threshold).
//! - [`OutputFormat`]: Lossless PNG for files and archives, JPEG for PDF pages.

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Sharpening parameters for unsharp mask.
///
/// - `sigma`: Standard deviation of the Gaussian blur (higher = more sharpening)
/// - `threshold`: Minimum brightness difference to sharpen (0 = sharpen all pixels)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sharpening {
    pub sigma: f32,
    pub threshold: i32,
}

impl Sharpening {
    /// Light sharpening.
    pub fn light() -> Self {
        Self {
            sigma: 0.5,
            threshold: 0,
        }
    }

    /// Map the 0–100 sharpen slider onto an unsharp mask. Zero means off.
    pub fn from_amount(amount: f64) -> Option<Self> {
        if !(amount > 0.0) {
            return None;
        }
        let amount = amount.min(100.0) as f32;
        Some(Self {
            sigma: 0.5 + amount / 100.0 * 2.0,
            threshold: 0,
        })
    }
}

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Png,
    Jpeg(Quality),
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg(_) => "jpg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg(_) => "image/jpeg",
        }
    }

    pub fn is_lossless(self) -> bool {
        matches!(self, OutputFormat::Png)
    }
}
