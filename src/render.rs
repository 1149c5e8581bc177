//! Crop render pipeline.
//!
//! Turns one [`CropRecord`] plus the process-wide [`EffectSpec`] into output
//! pixels and encoded bytes. The steps run in a fixed order:
//!
//! 1. **Scale**: natural / displayed scale factors; the crop rectangle is
//!    always in displayed space and is scaled before sampling.
//! 2. **Surface**: logical size is the resize target when it is square,
//!    otherwise the crop's own size; both axes are multiplied by the
//!    oversampling ratio `max(device_pixel_ratio * 2, 4)`.
//! 3. **Filter**: the filter expression and sharpening apply to the
//!    sampled source pixels, before resampling.
//! 4. **Sample**: the natural-space region is resampled (Lanczos3) into
//!    the surface.
//! 5. **Overlays**: watermark, border, signature, drawn without any filter.
//! 6. **Encode**: PNG for files and archives, JPEG for PDF pages.
//!
//! The pipeline is a pure function of its inputs: the same record, raster
//! and effect spec give byte-identical output. The SHA-256 of the encoded
//! bytes is the render's fingerprint.
//!
//! A record whose source has no natural dimensions (decode pending or
//! failed), or whose crop falls outside the raster, renders to
//! [`RenderOutput::empty`]. Callers check [`RenderOutput::is_empty`] and skip.

use crate::cache::{RenderCache, hash_bytes, hash_render_params};
use crate::config::RenderConfig;
use crate::effects::EffectSpec;
use crate::imaging::calculations::{pixel_ratio, scale_factors, source_region, surface_dimensions};
use crate::imaging::filters::FilterError;
use crate::imaging::operations::{SampleParams, sample_region};
use crate::imaging::overlay::{OverlayFonts, draw_overlays};
use crate::imaging::{BackendError, ImageBackend, OutputFormat};
use crate::naming::crop_filename;
use crate::types::{CropRecord, ImageIndex, Size};
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("encode failed: {0}")]
    Backend(#[from] BackendError),
    #[error("bad filter expression: {0}")]
    Filter(#[from] FilterError),
}

/// Result of one render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    /// Final surface, `None` for the empty sentinel.
    pub pixels: Option<RgbaImage>,
    pub encoded: Vec<u8>,
    pub format: OutputFormat,
    pub suggested_filename: String,
    /// SHA-256 hex of `encoded`.
    pub fingerprint: String,
}

impl RenderOutput {
    /// Sentinel for "nothing to render yet".
    pub fn empty() -> Self {
        Self {
            pixels: None,
            encoded: Vec::new(),
            format: OutputFormat::Png,
            suggested_filename: String::new(),
            fingerprint: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }
}

/// Logical output size: a square resize target wins, otherwise the crop size.
pub fn logical_size(crop: Size, resize_target: Option<(u32, u32)>) -> Size {
    match resize_target {
        Some((w, h)) if w == h && w > 0 => Size {
            width: w as f64,
            height: h as f64,
        },
        _ => crop,
    }
}

/// Stateless renderer bundling a codec backend, overlay fonts and the
/// `[render]` settings.
pub struct Renderer<B: ImageBackend> {
    backend: B,
    fonts: OverlayFonts,
    config: RenderConfig,
}

impl<B: ImageBackend> Renderer<B> {
    pub fn new(backend: B, fonts: OverlayFonts, config: RenderConfig) -> Self {
        Self {
            backend,
            fonts,
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Oversampling ratio for this renderer.
    pub fn pixel_ratio(&self) -> f64 {
        pixel_ratio(self.config.device_pixel_ratio, self.config.min_pixel_ratio)
    }

    /// Render one record. See the [module docs](self) for the steps.
    pub fn render(
        &self,
        index: ImageIndex,
        record: &CropRecord,
        effects: &EffectSpec,
        resize_target: Option<(u32, u32)>,
        format: OutputFormat,
    ) -> Result<RenderOutput, RenderError> {
        let (Some(raster), Some(natural)) = (record.image.raster(), record.image.natural()) else {
            debug!(index, name = %record.name, "source not decoded, empty render");
            return Ok(RenderOutput::empty());
        };
        let Some(scale) = scale_factors(natural, record.image.displayed()) else {
            debug!(index, "degenerate display size, empty render");
            return Ok(RenderOutput::empty());
        };

        let crop = Size {
            width: record.rect.width,
            height: record.rect.height,
        };
        let logical = logical_size(crop, resize_target);
        let ratio = self.pixel_ratio();
        let surface = surface_dimensions(logical, ratio);

        let Some(region) = source_region(record.rect, scale, natural) else {
            debug!(index, "crop outside raster, empty render");
            return Ok(RenderOutput::empty());
        };

        let filters = effects.filter_ops()?;
        let params = SampleParams {
            region,
            surface,
            filters: &filters,
            blur_scale: (region.2 as f64 / logical.width) as f32,
            sharpening: effects.sharpening(),
        };
        let mut pixels = sample_region(raster, &params);
        draw_overlays(&mut pixels, &effects.overlays, &self.fonts, ratio as f32);

        let encoded = self.backend.encode(&pixels, format)?;
        let fingerprint = hash_bytes(&encoded);
        Ok(RenderOutput {
            pixels: Some(pixels),
            encoded,
            format,
            suggested_filename: crop_filename(Some(&record.name), index),
            fingerprint,
        })
    }

    /// Render through a [`RenderCache`]: unchanged inputs return the cached
    /// output without touching the pipeline.
    pub fn render_cached(
        &self,
        cache: &mut RenderCache,
        index: ImageIndex,
        record: &CropRecord,
        effects: &EffectSpec,
        resize_target: Option<(u32, u32)>,
        format: OutputFormat,
    ) -> Result<Arc<RenderOutput>, RenderError> {
        let source_hash = record.image.content_hash();
        let params_hash =
            hash_render_params(record.rect, effects, resize_target, format, self.pixel_ratio());
        if let Some(hit) = cache.lookup(index, source_hash, &params_hash) {
            // entries are shared by content, the name belongs to this record
            let filename = crop_filename(Some(&record.name), index);
            if hit.suggested_filename == filename {
                return Ok(hit);
            }
            let mut renamed = RenderOutput::clone(&hit);
            renamed.suggested_filename = filename;
            return Ok(Arc::new(renamed));
        }
        let output = self.render(index, record, effects, resize_target, format)?;
        Ok(cache.insert(index, source_hash, &params_hash, output))
    }
}
