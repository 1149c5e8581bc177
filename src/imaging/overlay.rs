//! Watermark, border and signature drawing.
//!
//! Overlays are drawn after filtering onto the final output surface, in a
//! fixed order: watermark (bottom-right), border, signature (bottom-left).
//! Each one is painted on its own transparent layer and alpha-composited,
//! so semi-transparent colors blend instead of overwriting pixels.
//!
//! Text needs a font. [`OverlayFonts`] holds the optional overlay and
//! signature faces. [`OverlayFonts::resolve`] falls back to a system font
//! when `[fonts]` names none; when no face is loaded at all, text overlays
//! are skipped and a debug line is logged, while the border still renders.

use crate::config::FontConfig;
use crate::effects::{BorderOverlay, Color, OverlaySpec, TextOverlay};
use ab_glyph::FontVec;
use image::{Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use imageproc::rect::Rect;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Distance between text and the surface edge, in logical pixels.
const EDGE_PADDING: f32 = 10.0;
/// Horizontal shear applied to the signature layer (tan of the slant angle).
const SIGNATURE_SLANT: f32 = 0.25;
/// Outline color behind watermark text.
const OUTLINE: Color = Color::BLACK;

const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse font file: {0}")]
    InvalidFont(PathBuf),
}

/// Font faces for text overlays. The signature falls back to the overlay
/// face when it has none of its own.
#[derive(Default)]
pub struct OverlayFonts {
    overlay: Option<FontVec>,
    signature: Option<FontVec>,
}

impl fmt::Debug for OverlayFonts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayFonts")
            .field("overlay", &self.overlay.is_some())
            .field("signature", &self.signature.is_some())
            .finish()
    }
}

fn load_font(path: &Path) -> Result<FontVec, OverlayError> {
    let data = std::fs::read(path)?;
    FontVec::try_from_vec(data).map_err(|_| OverlayError::InvalidFont(path.to_path_buf()))
}

impl OverlayFonts {
    /// No fonts: only the border can render.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_font(font: FontVec) -> Self {
        Self {
            overlay: Some(font),
            signature: None,
        }
    }

    /// Load the faces named in `[fonts]`. Unset paths stay empty.
    pub fn from_config(config: &FontConfig) -> Result<Self, OverlayError> {
        let overlay = config.overlay.as_deref().map(load_font).transpose()?;
        let signature = config.signature.as_deref().map(load_font).transpose()?;
        Ok(Self { overlay, signature })
    }

    /// Faces from `[fonts]`, or a system font when neither path is set.
    pub fn resolve(config: &FontConfig) -> Result<Self, OverlayError> {
        if config.overlay.is_none() && config.signature.is_none() {
            return Ok(Self::with_system_font());
        }
        Self::from_config(config)
    }

    /// Try a few well-known system font locations.
    pub fn with_system_font() -> Self {
        for path in SYSTEM_FONT_PATHS {
            if let Ok(font) = load_font(Path::new(path)) {
                info!("Loaded system font: {}", path);
                return Self::from_font(font);
            }
        }
        debug!("No system font found, text overlays will be skipped");
        Self::none()
    }

    pub fn has_text_font(&self) -> bool {
        self.overlay.is_some()
    }

    fn signature_font(&self) -> Option<&FontVec> {
        self.signature.as_ref().or(self.overlay.as_ref())
    }
}

/// Draw every enabled overlay onto `surface`. `ratio` converts logical sizes
/// into surface pixels.
pub fn draw_overlays(
    surface: &mut RgbaImage,
    spec: &OverlaySpec,
    fonts: &OverlayFonts,
    ratio: f32,
) {
    if spec.watermark.enabled {
        match fonts.overlay.as_ref() {
            Some(font) => draw_watermark(surface, &spec.watermark, font, ratio),
            None => debug!("no overlay font loaded, skipping watermark"),
        }
    }
    if spec.border.enabled {
        draw_border(surface, &spec.border, ratio);
    }
    if spec.signature.enabled {
        match fonts.signature_font() {
            Some(font) => draw_signature(surface, &spec.signature, font, ratio),
            None => debug!("no signature font loaded, skipping signature"),
        }
    }
}

fn blank_layer(surface: &RgbaImage) -> RgbaImage {
    RgbaImage::from_pixel(surface.width(), surface.height(), Rgba([0, 0, 0, 0]))
}

fn text_origin(surface: &RgbaImage, text_w: u32, text_h: u32, pad: f32, right: bool) -> (i32, i32) {
    let pad = pad.round() as i32;
    let x = if right {
        surface.width() as i32 - text_w as i32 - pad
    } else {
        pad
    };
    let y = surface.height() as i32 - text_h as i32 - pad;
    (x, y)
}

/// Bottom-right, semi-transparent, outlined.
fn draw_watermark(surface: &mut RgbaImage, overlay: &TextOverlay, font: &FontVec, ratio: f32) {
    if overlay.text.trim().is_empty() {
        return;
    }
    let scale = overlay.size * ratio;
    let (w, h) = text_size(scale, font, &overlay.text);
    let (x, y) = text_origin(surface, w, h, EDGE_PADDING * ratio, true);

    let mut layer = blank_layer(surface);
    let outline = OUTLINE.to_rgba(overlay.opacity);
    let fill = overlay.color.to_rgba(overlay.opacity);
    let offset = (ratio / 2.0).round().max(1.0) as i32;
    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, 1), (-1, 1), (1, -1)] {
        let (ox, oy) = (x + dx * offset, y + dy * offset);
        draw_text_mut(&mut layer, outline, ox, oy, scale, font, &overlay.text);
    }
    draw_text_mut(&mut layer, fill, x, y, scale, font, &overlay.text);
    imageops::overlay(surface, &layer, 0, 0);
}

/// Stroked rectangle lying entirely inside the surface: four bands of
/// `width * ratio` pixels along the edges.
fn draw_border(surface: &mut RgbaImage, border: &BorderOverlay, ratio: f32) {
    let (w, h) = surface.dimensions();
    let t = ((border.width * ratio).round().max(1.0) as u32).min(w).min(h);

    let mut layer = blank_layer(surface);
    let color = border.color.to_rgba(1.0);
    let bands = [
        Rect::at(0, 0).of_size(w, t),
        Rect::at(0, (h - t) as i32).of_size(w, t),
        Rect::at(0, 0).of_size(t, h),
        Rect::at((w - t) as i32, 0).of_size(t, h),
    ];
    for band in bands {
        draw_filled_rect_mut(&mut layer, band, color);
    }
    imageops::overlay(surface, &layer, 0, 0);
}

/// Bottom-left, sheared to an italic slant around the text baseline.
fn draw_signature(surface: &mut RgbaImage, overlay: &TextOverlay, font: &FontVec, ratio: f32) {
    if overlay.text.trim().is_empty() {
        return;
    }
    let scale = overlay.size * ratio;
    let (w, h) = text_size(scale, font, &overlay.text);
    let (x, y) = text_origin(surface, w, h, EDGE_PADDING * ratio, false);

    let mut layer = blank_layer(surface);
    let fill = overlay.color.to_rgba(overlay.opacity);
    draw_text_mut(&mut layer, fill, x, y, scale, font, &overlay.text);

    // x' = x + slant * (baseline - y): the top leans right, the baseline stays put.
    let baseline = (y + h as i32) as f32;
    let shear = Projection::from_matrix([
        1.0,
        -SIGNATURE_SLANT,
        SIGNATURE_SLANT * baseline,
        0.0,
        1.0,
        0.0,
        0.0,
        0.0,
        1.0,
    ]);
    let layer = match shear {
        Some(projection) => warp(&layer, &projection, Interpolation::Bilinear, Rgba([0, 0, 0, 0])),
        None => layer,
    };
    imageops::overlay(surface, &layer, 0, 0);
}
