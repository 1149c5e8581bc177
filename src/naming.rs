//! Output naming conventions.
//!
//! Every exported file name is derived here so the individual, ZIP and PDF
//! exporters stay consistent:
//!
//! - `cropped_007.png`: fallback name for the 7th image (1-based, 3 digits)
//! - `cropped_images_2026-03-14.zip`: archive name, ISO date
//! - `CropSession1_2026-03-14.pdf`: document name from the tab name,
//!   characters outside `[A-Za-z0-9-_]` stripped

use crate::types::ImageIndex;
use chrono::{DateTime, Utc};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// ISO calendar date (`YYYY-MM-DD`) of a timestamp.
pub fn iso_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Name for a rendered crop: the stored source name, or `cropped_NNN.png`.
pub fn crop_filename(stored_name: Option<&str>, index: ImageIndex) -> String {
    match stored_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("cropped_{}.png", format_index(index + 1)),
    }
}

/// Archive name for a ZIP export.
pub fn zip_filename(at: DateTime<Utc>) -> String {
    format!("cropped_images_{}.zip", iso_date(at))
}

/// Drop every character outside `[A-Za-z0-9-_]`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Document name for a PDF export.
pub fn pdf_filename(tab_name: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.pdf", sanitize_name(tab_name), iso_date(at))
}
