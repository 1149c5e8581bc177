//! Pixel work for crop rendering, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Sample crop region** | `imageops::crop_imm` + `resize` (Lanczos3) |
//! | **Filters** | `imageops::{brighten, contrast, huerotate, blur}` + color matrices |
//! | **Sharpen** | `imageops::unsharpen` |
//! | **Overlays** | `imageproc::drawing` + `ab_glyph` |
//! | **Encode** | PNG / JPEG via `image::codecs` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for surface and page geometry (unit testable)
//! - **Parameters**: Data structures describing encode and sharpen settings
//! - **Filters**: CSS-style filter expressions parsed into pixel operations
//! - **Overlay**: Text and border decorations drawn onto the surface
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
pub mod calculations;
pub mod filters;
pub mod operations;
pub mod overlay;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use params::{OutputFormat, Quality, Sharpening};
pub use rust_backend::RustBackend;
