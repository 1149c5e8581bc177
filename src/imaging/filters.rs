//! CSS filter expressions and their pixel implementations.
//!
//! Supported functions, with the W3C Filter Effects color matrices:
//!
//! | Function | Argument | Identity |
//! |---|---|---|
//! | `sepia` | amount (`%` or number, 0–1) | `0` |
//! | `grayscale` | amount | `0` |
//! | `invert` | amount | `0` |
//! | `opacity` | amount | `1` |
//! | `saturate` | factor | `1` |
//! | `brightness` | factor | `1` |
//! | `contrast` | factor | `1` |
//! | `hue-rotate` | angle (`deg`) | `0deg` |
//! | `blur` | length (`px`) | `0px` |
//!
//! Color functions run per pixel in floating point, clamping after every
//! function like a browser compositor does. Blur is a Gaussian whose sigma is
//! scaled from logical pixels into source pixels by the caller.

use image::{RgbaImage, imageops};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("unknown filter function '{0}'")]
    UnknownFunction(String),
    #[error("invalid argument '{value}' for {function}()")]
    InvalidArgument { function: String, value: String },
    #[error("malformed filter expression: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOp {
    Sepia(f32),
    Grayscale(f32),
    Invert(f32),
    Opacity(f32),
    Saturate(f32),
    Brightness(f32),
    Contrast(f32),
    /// Degrees.
    HueRotate(f32),
    /// Logical pixels.
    Blur(f32),
}

#[derive(Clone, Copy, PartialEq)]
enum Unit {
    None,
    Percent,
    Deg,
    Px,
}

fn parse_argument(function: &str, raw: &str) -> Result<(f32, Unit), FilterError> {
    let invalid = || FilterError::InvalidArgument {
        function: function.to_string(),
        value: raw.to_string(),
    };
    let s = raw.trim();
    let (num, unit) = if let Some(n) = s.strip_suffix('%') {
        (n, Unit::Percent)
    } else if let Some(n) = s.strip_suffix("deg") {
        (n, Unit::Deg)
    } else if let Some(n) = s.strip_suffix("px") {
        (n, Unit::Px)
    } else {
        (s, Unit::None)
    };
    let value: f32 = num.trim().parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    Ok((value, unit))
}

fn build_op(function: &str, raw: &str) -> Result<FilterOp, FilterError> {
    let invalid = || FilterError::InvalidArgument {
        function: function.to_string(),
        value: raw.to_string(),
    };
    let is_amount = matches!(
        function,
        "sepia" | "grayscale" | "invert" | "opacity" | "saturate" | "brightness" | "contrast"
    );

    // Empty argument means the function's full effect (1) or zero for lengths/angles.
    if raw.trim().is_empty() {
        return match function {
            "hue-rotate" => Ok(FilterOp::HueRotate(0.0)),
            "blur" => Ok(FilterOp::Blur(0.0)),
            _ if is_amount => build_op(function, "1"),
            other => Err(FilterError::UnknownFunction(other.to_string())),
        };
    }

    let (value, unit) = parse_argument(function, raw)?;
    let amount = || -> Result<f32, FilterError> {
        let v = match unit {
            Unit::None => value,
            Unit::Percent => value / 100.0,
            _ => return Err(invalid()),
        };
        if v < 0.0 { Err(invalid()) } else { Ok(v) }
    };

    match function {
        "sepia" => Ok(FilterOp::Sepia(amount()?.min(1.0))),
        "grayscale" => Ok(FilterOp::Grayscale(amount()?.min(1.0))),
        "invert" => Ok(FilterOp::Invert(amount()?.min(1.0))),
        "opacity" => Ok(FilterOp::Opacity(amount()?.min(1.0))),
        "saturate" => Ok(FilterOp::Saturate(amount()?)),
        "brightness" => Ok(FilterOp::Brightness(amount()?)),
        "contrast" => Ok(FilterOp::Contrast(amount()?)),
        "hue-rotate" => match unit {
            Unit::Deg => Ok(FilterOp::HueRotate(value)),
            Unit::None if value == 0.0 => Ok(FilterOp::HueRotate(0.0)),
            _ => Err(invalid()),
        },
        "blur" => match unit {
            Unit::Px if value >= 0.0 => Ok(FilterOp::Blur(value)),
            Unit::None if value == 0.0 => Ok(FilterOp::Blur(0.0)),
            _ => Err(invalid()),
        },
        other => Err(FilterError::UnknownFunction(other.to_string())),
    }
}

/// Parse a space-separated list of filter functions. `none` and the empty
/// string yield an empty pipeline.
pub fn parse_filter(expr: &str) -> Result<Vec<FilterOp>, FilterError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }

    let mut ops = Vec::new();
    let mut rest = trimmed;
    while !rest.is_empty() {
        let open = rest
            .find('(')
            .ok_or_else(|| FilterError::Malformed(rest.to_string()))?;
        let close = rest[open..]
            .find(')')
            .map(|i| open + i)
            .ok_or_else(|| FilterError::Malformed(rest.to_string()))?;
        let name = rest[..open].trim().to_ascii_lowercase();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(FilterError::Malformed(rest.to_string()));
        }
        ops.push(build_op(&name, &rest[open + 1..close])?);
        rest = rest[close + 1..].trim_start();
    }
    Ok(ops)
}

/// True when the op leaves every pixel unchanged.
pub fn is_identity(op: FilterOp) -> bool {
    match op {
        FilterOp::Sepia(v) | FilterOp::Grayscale(v) | FilterOp::Invert(v) => v == 0.0,
        FilterOp::Opacity(v)
        | FilterOp::Saturate(v)
        | FilterOp::Brightness(v)
        | FilterOp::Contrast(v) => v == 1.0,
        FilterOp::HueRotate(d) => d % 360.0 == 0.0,
        FilterOp::Blur(px) => px == 0.0,
    }
}

// ============================================================================
// Pixel implementations
// ============================================================================

type Matrix = [[f32; 3]; 3];

fn sepia_matrix(amount: f32) -> Matrix {
    let k = 1.0 - amount;
    [
        [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
        [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
        [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
    ]
}

fn grayscale_matrix(amount: f32) -> Matrix {
    let k = 1.0 - amount;
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
    ]
}

fn saturate_matrix(s: f32) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> Matrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn apply_matrix(m: &Matrix, c: [f32; 3]) -> [f32; 3] {
    let row = |r: &[f32; 3]| (r[0] * c[0] + r[1] * c[1] + r[2] * c[2]).clamp(0.0, 1.0);
    [row(&m[0]), row(&m[1]), row(&m[2])]
}

/// Apply one color op to normalized RGBA.
fn apply_color_op(op: FilterOp, px: [f32; 4]) -> [f32; 4] {
    let [r, g, b, a] = px;
    let rgb = [r, g, b];
    let out = match op {
        FilterOp::Sepia(v) => apply_matrix(&sepia_matrix(v), rgb),
        FilterOp::Grayscale(v) => apply_matrix(&grayscale_matrix(v), rgb),
        FilterOp::Saturate(v) => apply_matrix(&saturate_matrix(v), rgb),
        FilterOp::HueRotate(d) => apply_matrix(&hue_rotate_matrix(d), rgb),
        FilterOp::Brightness(v) => rgb.map(|c| (c * v).clamp(0.0, 1.0)),
        FilterOp::Contrast(v) => rgb.map(|c| ((c - 0.5) * v + 0.5).clamp(0.0, 1.0)),
        FilterOp::Invert(v) => rgb.map(|c| c * (1.0 - v) + (1.0 - c) * v),
        FilterOp::Opacity(v) => return [r, g, b, (a * v).clamp(0.0, 1.0)],
        FilterOp::Blur(_) => rgb,
    };
    [out[0], out[1], out[2], a]
}

fn apply_color_run(image: &mut RgbaImage, run: &[FilterOp]) {
    if run.is_empty() {
        return;
    }
    for pixel in image.pixels_mut() {
        let mut px = pixel.0.map(|c| c as f32 / 255.0);
        for op in run {
            px = apply_color_op(*op, px);
        }
        pixel.0 = px.map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8);
    }
}

/// Run the pipeline in order. `blur_scale` converts logical blur radii into
/// pixels of `image`.
pub fn apply_filters(image: RgbaImage, ops: &[FilterOp], blur_scale: f32) -> RgbaImage {
    let mut image = image;
    let mut run: Vec<FilterOp> = Vec::new();
    for op in ops.iter().copied().filter(|op| !is_identity(*op)) {
        match op {
            FilterOp::Blur(px) => {
                apply_color_run(&mut image, &run);
                run.clear();
                let sigma = px * blur_scale;
                if sigma > 0.0 {
                    image = imageops::blur(&image, sigma);
                }
            }
            color => run.push(color),
        }
    }
    apply_color_run(&mut image, &run);
    image
}
