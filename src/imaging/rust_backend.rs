//! Pure Rust codec backend.
//!
//! Everything is statically linked into the library.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory` |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder`, alpha flattened onto white |

use super::backend::{BackendError, ImageBackend};
use super::params::OutputFormat;
use crate::types::Dimensions;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageReader, RgbImage, RgbaImage};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Composite straight alpha over an opaque white background.
fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let a = a as u32;
        let mix = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([mix(r), mix(g), mix(b)])
    })
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| BackendError::DecodeFailed(format!("Failed to read dimensions: {}", e)))?;
        Ok(Dimensions { width, height })
    }

    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage, BackendError> {
        image::load_from_memory(bytes)
            .map(|img| img.to_rgba8())
            .map_err(|e| BackendError::DecodeFailed(e.to_string()))
    }

    fn encode(&self, image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>, BackendError> {
        let mut out = Vec::new();
        match format {
            OutputFormat::Png => PngEncoder::new(&mut out)
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| BackendError::EncodeFailed(format!("PNG encode failed: {}", e)))?,
            OutputFormat::Jpeg(quality) => {
                let rgb = flatten_on_white(image);
                JpegEncoder::new_with_quality(&mut out, quality.value() as u8)
                    .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                    .map_err(|e| BackendError::EncodeFailed(format!("JPEG encode failed: {}", e)))?
            }
        }
        Ok(out)
    }
}
