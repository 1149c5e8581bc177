//! Shared types used across the store, the render pipeline, and the exporters.
//!
//! Geometry lives in *displayed* space: the coordinate system of the image as
//! it is shown for editing, which may be a scaled-down version of the decoded
//! raster. The render pipeline converts to natural (raster) space right before
//! sampling.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Position of an image in the working set. Stable until a remove/reorder.
pub type ImageIndex = usize;

/// Smallest extent a crop side may shrink to.
pub const MIN_EXTENT: f64 = 1.0;

/// Integer pixel dimensions of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Fractional size in displayed space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Crop rectangle in displayed-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering the whole displayed image.
    pub fn full(displayed: Size) -> Self {
        Self::new(0.0, 0.0, displayed.width, displayed.height)
    }

    /// Clamp into `[0, bounds.width] x [0, bounds.height]`.
    ///
    /// Sides are floored at [`MIN_EXTENT`] first, then shrunk to fit; the
    /// origin moves only as far as needed to keep the rectangle inside.
    pub fn clamped_to(self, bounds: Size) -> Self {
        let max_w = bounds.width.max(MIN_EXTENT);
        let max_h = bounds.height.max(MIN_EXTENT);
        let width = sanitize(self.width).max(MIN_EXTENT).min(max_w);
        let height = sanitize(self.height).max(MIN_EXTENT).min(max_h);
        let x = sanitize(self.x).clamp(0.0, (max_w - width).max(0.0));
        let y = sanitize(self.y).clamp(0.0, (max_h - height).max(0.0));
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Partial crop update. `None` fields keep the stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CropPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

impl CropPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    pub fn rect(rect: CropRect) -> Self {
        Self {
            x: Some(rect.x),
            y: Some(rect.y),
            width: Some(rect.width),
            height: Some(rect.height),
        }
    }

    pub fn touches_size(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }
}

/// Decoded source image plus the size it is displayed at.
///
/// Never mutated after construction; records and history entries share it
/// through [`ImageRef`].
#[derive(Debug)]
pub struct SourceImage {
    name: String,
    raster: Option<Arc<RgbaImage>>,
    displayed: Size,
    content_hash: String,
}

/// Shared handle to a [`SourceImage`].
pub type ImageRef = Arc<SourceImage>;

impl SourceImage {
    pub fn new(
        name: impl Into<String>,
        raster: RgbaImage,
        displayed: Size,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            raster: Some(Arc::new(raster)),
            displayed,
            content_hash: content_hash.into(),
        }
    }

    /// An image whose decode has not finished (or failed). Renders to the
    /// empty sentinel.
    pub fn pending(name: impl Into<String>, displayed: Size) -> Self {
        Self {
            name: name.into(),
            raster: None,
            displayed,
            content_hash: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn raster(&self) -> Option<&RgbaImage> {
        self.raster.as_deref()
    }

    /// Natural raster dimensions, `None` until decoded.
    pub fn natural(&self) -> Option<Dimensions> {
        self.raster.as_ref().map(|r| Dimensions {
            width: r.width(),
            height: r.height(),
        })
    }

    pub fn displayed(&self) -> Size {
        self.displayed
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

/// One crop per loaded image.
#[derive(Debug, Clone)]
pub struct CropRecord {
    pub rect: CropRect,
    /// Width / height ratio enforced on resize.
    pub aspect_lock: Option<f64>,
    pub image: ImageRef,
    pub name: String,
}

impl CropRecord {
    pub fn new(image: ImageRef, rect: CropRect) -> Self {
        let name = image.name().to_string();
        let rect = rect.clamped_to(image.displayed());
        Self {
            rect,
            aspect_lock: None,
            image,
            name,
        }
    }

    pub fn bounds(&self) -> Size {
        self.image.displayed()
    }
}

/// An input blob from the file-selection surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    pub name: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub mime: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            last_modified: 0,
            mime: mime.into(),
            bytes,
        }
    }

    pub fn with_last_modified(mut self, millis: i64) -> Self {
        self.last_modified = millis;
        self
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    /// Key used to reject the same file being added twice.
    pub fn identity(&self) -> (&str, u64, i64) {
        (&self.name, self.size, self.last_modified)
    }
}
