//! Pure dimension math for the render pipeline and PDF layout.
//!
//! Nothing here touches pixels; every function is unit tested on its own.

use crate::types::{CropRect, Dimensions, Size};

/// Natural-to-displayed scale factors `(scale_x, scale_y)`.
///
/// Returns `None` when either size is degenerate.
pub fn scale_factors(natural: Dimensions, displayed: Size) -> Option<(f64, f64)> {
    if natural.is_empty() || !(displayed.width > 0.0) || !(displayed.height > 0.0) {
        return None;
    }
    Some((
        natural.width as f64 / displayed.width,
        natural.height as f64 / displayed.height,
    ))
}

/// Oversampling factor: `max(device_pixel_ratio * 2, floor)`.
pub fn pixel_ratio(device_pixel_ratio: f64, floor: f64) -> f64 {
    (device_pixel_ratio * 2.0).max(floor)
}

/// Output surface in device pixels for a logical size at `ratio`.
pub fn surface_dimensions(logical: Size, ratio: f64) -> Dimensions {
    let px = |v: f64| ((v * ratio).round().max(1.0)) as u32;
    Dimensions {
        width: px(logical.width),
        height: px(logical.height),
    }
}

/// Integer natural-space region `(x, y, width, height)` sampled for a crop.
///
/// The region is clipped to the raster; `None` if nothing remains.
pub fn source_region(
    crop: CropRect,
    scale: (f64, f64),
    natural: Dimensions,
) -> Option<(u32, u32, u32, u32)> {
    let (sx, sy) = scale;
    let x0 = (crop.x * sx).round().max(0.0);
    let y0 = (crop.y * sy).round().max(0.0);
    let x1 = ((crop.x + crop.width) * sx).round().min(natural.width as f64);
    let y1 = ((crop.y + crop.height) * sy).round().min(natural.height as f64);
    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Displayed size for a raster, longest edge capped at `max_edge`.
pub fn fit_within(natural: Dimensions, max_edge: u32) -> Size {
    let longest = natural.width.max(natural.height);
    if longest <= max_edge || longest == 0 {
        return Size {
            width: natural.width as f64,
            height: natural.height as f64,
        };
    }
    let k = max_edge as f64 / longest as f64;
    Size {
        width: (natural.width as f64 * k).round().max(1.0),
        height: (natural.height as f64 * k).round().max(1.0),
    }
}

/// Placement of an image on a page, in page units with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Fit an image onto a page leaving `margin` on the constraining axis,
/// preserving aspect ratio and centering on both axes.
pub fn fit_to_page(image: Dimensions, page: Size, margin: f64) -> Placement {
    let image_aspect = image.width.max(1) as f64 / image.height.max(1) as f64;
    let page_aspect = page.width / page.height;

    let (width, height) = if image_aspect > page_aspect {
        let w = page.width - margin * 2.0;
        (w, w / image_aspect)
    } else {
        let h = page.height - margin * 2.0;
        (h * image_aspect, h)
    };

    Placement {
        x: (page.width - width) / 2.0,
        y: (page.height - height) / 2.0,
        width,
        height,
    }
}
