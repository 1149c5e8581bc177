//! High-level image operations.
//!
//! These functions combine calculations with backend execution and the pixel
//! filters. They take plain parameters, compute dimensions, and return new
//! rasters; nothing here mutates shared state.

use super::backend::{BackendError, ImageBackend};
use super::calculations::fit_within;
use super::filters::{FilterOp, apply_filters};
use super::params::Sharpening;
use crate::cache::hash_bytes;
use crate::types::{Dimensions, ImageFile, SourceImage};
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Decode an input blob into a [`SourceImage`] displayed at most
/// `preview_max_edge` pixels on its longest side.
pub fn decode_source(
    backend: &impl ImageBackend,
    file: &ImageFile,
    preview_max_edge: u32,
) -> Result<SourceImage> {
    let raster = backend.decode(&file.bytes)?;
    let natural = Dimensions {
        width: raster.width(),
        height: raster.height(),
    };
    if natural.is_empty() {
        return Err(BackendError::DecodeFailed(format!(
            "{} has no pixels",
            file.name
        )));
    }
    let displayed = fit_within(natural, preview_max_edge);
    Ok(SourceImage::new(
        file.name.clone(),
        raster,
        displayed,
        hash_bytes(&file.bytes),
    ))
}

/// What to sample and where to put it.
#[derive(Debug, Clone, Copy)]
pub struct SampleParams<'a> {
    /// Natural-space region `(x, y, width, height)`.
    pub region: (u32, u32, u32, u32),
    /// Output surface in device pixels.
    pub surface: Dimensions,
    pub filters: &'a [FilterOp],
    /// Source pixels per logical pixel, for blur radii.
    pub blur_scale: f32,
    pub sharpening: Option<Sharpening>,
}

/// Cut the region out of `raster`, filter the sampled pixels, then resample
/// into the surface with Lanczos3.
pub fn sample_region(raster: &RgbaImage, params: &SampleParams<'_>) -> RgbaImage {
    let (x, y, w, h) = params.region;
    let cropped = imageops::crop_imm(raster, x, y, w, h).to_image();

    let mut filtered = apply_filters(cropped, params.filters, params.blur_scale);
    if let Some(sharpening) = params.sharpening {
        filtered = imageops::unsharpen(&filtered, sharpening.sigma, sharpening.threshold);
    }

    let Dimensions { width, height } = params.surface;
    if filtered.dimensions() == (width, height) {
        return filtered;
    }
    imageops::resize(&filtered, width, height, FilterType::Lanczos3)
}
