//! Shared test utilities for the cropbatch test suite.
//!
//! Builders for synthetic rasters, source images, crop records and stores,
//! so unit tests never need fixture files on disk.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let mut store = store_with(&[(200, 100), (300, 300)]);
//! store.set(0, CropPatch::position(10.0, 10.0));
//! assert_eq!(store.get(1).unwrap().name, "img_1.png");
//! ```

use crate::imaging::{ImageBackend, OutputFormat, RustBackend};
use crate::store::CropStore;
use crate::types::{CropRect, CropRecord, ImageFile, ImageRef, Size, SourceImage};
use image::{Rgba, RgbaImage};
use std::sync::Arc;

// =========================================================================
// Rasters
// =========================================================================

/// Deterministic RGBA gradient.
pub fn gradient_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255])
    })
}

/// PNG-encoded gradient wrapped as an input blob.
pub fn png_file(name: &str, width: u32, height: u32) -> ImageFile {
    let bytes = RustBackend::new()
        .encode(&gradient_image(width, height), OutputFormat::Png)
        .unwrap();
    ImageFile::new(name, "image/png", bytes)
}

// =========================================================================
// Sources and records
// =========================================================================

/// Decoded gradient displayed at its natural size.
pub fn source(name: &str, width: u32, height: u32) -> ImageRef {
    source_scaled(name, width, height, width as f64, height as f64)
}

/// Decoded gradient displayed at an explicit size.
pub fn source_scaled(
    name: &str,
    width: u32,
    height: u32,
    displayed_w: f64,
    displayed_h: f64,
) -> ImageRef {
    Arc::new(SourceImage::new(
        name,
        gradient_image(width, height),
        Size {
            width: displayed_w,
            height: displayed_h,
        },
        format!("hash-{}", name),
    ))
}

/// Record covering the whole image.
pub fn full_record(name: &str, width: u32, height: u32) -> CropRecord {
    let image = source(name, width, height);
    let rect = CropRect::full(image.displayed());
    CropRecord::new(image, rect)
}

/// Store with one full-image record per `(width, height)`, named `img_<i>.png`.
pub fn store_with(sizes: &[(u32, u32)]) -> CropStore {
    let mut store = CropStore::new();
    for (i, (w, h)) in sizes.iter().enumerate() {
        store.insert(i, full_record(&format!("img_{}.png", i), *w, *h));
    }
    store
}
