//! One editing session (a tab): its files, crop records, settings and
//! selection.
//!
//! Store keys are file positions. A file whose decode failed stays in the
//! list but has no record, so `store.indices()` may have gaps. Removing or
//! moving a file remaps the store and the selection together and returns
//! the mapping, which callers holding per-index state (the render cache)
//! apply as well.

use crate::config::RenderConfig;
use crate::imaging::ImageBackend;
use crate::imaging::operations::decode_source;
use crate::store::{CropStore, StoreError};
use crate::types::{CropPatch, CropRect, CropRecord, ImageFile, ImageIndex, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Old index → new index.
pub type IndexMapping = HashMap<ImageIndex, ImageIndex>;

#[derive(Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("no image at index {0}")]
    UnknownImage(ImageIndex),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropSize {
    pub width: u32,
    pub height: u32,
}

impl CropSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_square(self) -> bool {
        self.width == self.height
    }

    fn as_size(self) -> Size {
        Size {
            width: self.width as f64,
            height: self.height as f64,
        }
    }
}

/// Named crop sizes offered by the size picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropSizePreset {
    Custom,
    Square256,
    Square512,
    Square,
    Standard,
    Photo,
    Widescreen,
}

impl CropSizePreset {
    pub const ALL: [CropSizePreset; 7] = [
        Self::Custom,
        Self::Square256,
        Self::Square512,
        Self::Square,
        Self::Standard,
        Self::Photo,
        Self::Widescreen,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Custom => "Custom",
            Self::Square256 => "256x256",
            Self::Square512 => "512x512",
            Self::Square => "1:1 Square",
            Self::Standard => "4:3 Standard",
            Self::Photo => "3:2 Photo",
            Self::Widescreen => "16:9 Widescreen",
        }
    }

    /// `None` for [`CropSizePreset::Custom`].
    pub fn size(self) -> Option<CropSize> {
        match self {
            Self::Custom => None,
            Self::Square256 => Some(CropSize::new(256, 256)),
            Self::Square512 => Some(CropSize::new(512, 512)),
            Self::Square => Some(CropSize::new(300, 300)),
            Self::Standard => Some(CropSize::new(400, 300)),
            Self::Photo => Some(CropSize::new(450, 300)),
            Self::Widescreen => Some(CropSize::new(480, 270)),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }
}

/// Per-tab toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabSettings {
    pub crop_size: Option<CropSize>,
    /// Lock every crop to a 1:1 aspect ratio.
    pub keep_ratio: bool,
    pub resize_on_export: bool,
    /// Lock mode: edits to one crop are copied to all others.
    pub lock_movement: bool,
    pub center_crop: bool,
    pub enable_ocr: bool,
}

impl Default for TabSettings {
    fn default() -> Self {
        Self {
            crop_size: None,
            keep_ratio: true,
            resize_on_export: true,
            lock_movement: false,
            center_crop: false,
            enable_ocr: true,
        }
    }
}

impl TabSettings {
    /// Resize target handed to the renderer on export.
    pub fn resize_target(&self) -> Option<(u32, u32)> {
        if !self.resize_on_export {
            return None;
        }
        self.crop_size.map(|s| (s.width, s.height))
    }

    fn aspect_lock(&self) -> Option<f64> {
        self.keep_ratio.then_some(1.0)
    }
}

/// Outcome of [`EditingSession::add_files`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddReport {
    pub added: Vec<ImageIndex>,
    pub duplicates: Vec<String>,
    pub not_images: Vec<String>,
    /// Kept in the file list, but without a crop record.
    pub failed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EditingSession {
    name: String,
    files: Vec<ImageFile>,
    store: CropStore,
    settings: TabSettings,
    /// Selected indices in the order they were selected.
    selection: Vec<ImageIndex>,
}

impl EditingSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_settings(name, TabSettings::default())
    }

    pub fn with_settings(name: impl Into<String>, settings: TabSettings) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            store: CropStore::new(),
            settings,
            selection: Vec::new(),
        }
    }

    /// Rebuild a session from saved files and records, keyed `0..n`.
    pub fn from_snapshot(
        name: impl Into<String>,
        files: Vec<ImageFile>,
        records: Vec<CropRecord>,
        settings: TabSettings,
    ) -> Self {
        let mut session = Self::with_settings(name, settings);
        session.files = files;
        for (index, record) in records.into_iter().enumerate() {
            session.store.insert(index, record);
        }
        session
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blank names are ignored. Returns whether the name changed.
    pub fn rename(&mut self, name: &str) -> bool {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.name = trimmed.to_string();
        true
    }

    pub fn files(&self) -> &[ImageFile] {
        &self.files
    }

    pub fn store(&self) -> &CropStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut CropStore {
        &mut self.store
    }

    pub fn settings(&self) -> &TabSettings {
        &self.settings
    }

    // =====================================================================
    // Files
    // =====================================================================

    /// Append files. Non-image blobs and files already present (same name,
    /// size and modification time) are rejected. Each accepted file is
    /// decoded and gets a crop record; a decode failure leaves the file
    /// without one.
    pub fn add_files(
        &mut self,
        files: impl IntoIterator<Item = ImageFile>,
        backend: &impl ImageBackend,
        config: &RenderConfig,
    ) -> AddReport {
        let mut report = AddReport::default();
        for file in files {
            if !file.is_image() {
                debug!(name = %file.name, mime = %file.mime, "not an image, ignored");
                report.not_images.push(file.name);
                continue;
            }
            if self.files.iter().any(|f| f.identity() == file.identity()) {
                info!(name = %file.name, "duplicate file, ignored");
                report.duplicates.push(file.name);
                continue;
            }

            let index = self.files.len();
            match decode_source(backend, &file, config.preview_max_edge) {
                Ok(source) => {
                    let source = Arc::new(source);
                    let rect = initial_rect(source.displayed(), &self.settings);
                    let mut record = CropRecord::new(source, rect);
                    record.aspect_lock = self.settings.aspect_lock();
                    self.store.insert(index, record);
                    report.added.push(index);
                }
                Err(e) => {
                    warn!(name = %file.name, error = %e, "decode failed, no crop record");
                    report.failed.push(file.name.clone());
                }
            }
            self.files.push(file);
        }
        report
    }

    /// Remove a file and its record. Later images shift down by one.
    pub fn remove_image(&mut self, index: ImageIndex) -> Result<IndexMapping, SessionError> {
        if index >= self.files.len() {
            return Err(SessionError::UnknownImage(index));
        }
        self.files.remove(index);
        self.store.remove(index);
        let mapping: IndexMapping = (0..=self.files.len())
            .filter(|&i| i != index)
            .map(|i| (i, if i > index { i - 1 } else { i }))
            .collect();
        self.apply_mapping(&mapping)?;
        Ok(mapping)
    }

    /// Move the file at `from` so it ends up at `to`.
    pub fn move_image(
        &mut self,
        from: ImageIndex,
        to: ImageIndex,
    ) -> Result<IndexMapping, SessionError> {
        let len = self.files.len();
        if from >= len {
            return Err(SessionError::UnknownImage(from));
        }
        if to >= len {
            return Err(SessionError::UnknownImage(to));
        }
        let mut order: Vec<ImageIndex> = (0..len).collect();
        let moved = order.remove(from);
        order.insert(to, moved);
        let mapping: IndexMapping = order
            .iter()
            .enumerate()
            .map(|(new, &old)| (old, new))
            .collect();

        self.apply_mapping(&mapping)?;
        let file = self.files.remove(from);
        self.files.insert(to, file);
        Ok(mapping)
    }

    fn apply_mapping(&mut self, mapping: &IndexMapping) -> Result<(), SessionError> {
        self.store.reindex_after_reorder(mapping)?;
        self.selection = self
            .selection
            .iter()
            .filter_map(|i| mapping.get(i).copied())
            .collect();
        Ok(())
    }

    // =====================================================================
    // Crops
    // =====================================================================

    /// User edit of one crop.
    pub fn update_crop(&mut self, index: ImageIndex, patch: CropPatch) -> Option<CropRect> {
        self.store.set(index, patch)
    }

    /// Per-image "Set to WxH". A user edit, so it fans out in lock mode.
    pub fn apply_crop_size(&mut self, index: ImageIndex) -> Option<CropRect> {
        let size = self.settings.crop_size?;
        self.store.set(index, CropPatch::size(size.width as f64, size.height as f64))
    }

    /// "Set all to": every record gets the configured crop size.
    pub fn apply_crop_size_to_all(&mut self) -> usize {
        match self.settings.crop_size {
            Some(size) => self.store.apply_size_to_all(size.as_size()),
            None => 0,
        }
    }

    // =====================================================================
    // Settings
    // =====================================================================

    pub fn set_crop_size(&mut self, size: Option<CropSize>) {
        self.settings.crop_size = size;
    }

    pub fn set_keep_ratio(&mut self, on: bool) {
        self.settings.keep_ratio = on;
        self.store.set_aspect_lock_all(self.settings.aspect_lock());
    }

    /// Turning centering on re-centers every crop once.
    pub fn set_center_crop(&mut self, on: bool) {
        self.settings.center_crop = on;
        if on {
            self.store.center_all();
        }
    }

    pub fn set_lock_movement(&mut self, on: bool) {
        self.settings.lock_movement = on;
    }

    pub fn set_resize_on_export(&mut self, on: bool) {
        self.settings.resize_on_export = on;
    }

    pub fn set_enable_ocr(&mut self, on: bool) {
        self.settings.enable_ocr = on;
    }

    // =====================================================================
    // Selection
    // =====================================================================

    pub fn selection(&self) -> &[ImageIndex] {
        &self.selection
    }

    pub fn is_selected(&self, index: ImageIndex) -> bool {
        self.selection.contains(&index)
    }

    /// Returns whether `index` is selected afterwards.
    pub fn toggle_selected(&mut self, index: ImageIndex) -> bool {
        if let Some(pos) = self.selection.iter().position(|&i| i == index) {
            self.selection.remove(pos);
            false
        } else {
            self.selection.push(index);
            true
        }
    }

    pub fn select_all(&mut self) {
        self.selection = (0..self.files.len()).collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// What an export covers: the selection in selection order, or every
    /// record when nothing is selected.
    pub fn export_indices(&self) -> Vec<ImageIndex> {
        if self.selection.is_empty() {
            self.store.indices()
        } else {
            self.selection.clone()
        }
    }
}

/// First crop of a newly loaded image.
fn initial_rect(displayed: Size, settings: &TabSettings) -> CropRect {
    let rect = match settings.crop_size {
        Some(size) => CropRect::new(0.0, 0.0, size.width as f64, size.height as f64),
        None => CropRect::full(displayed),
    }
    .clamped_to(displayed);
    if !settings.center_crop {
        return rect;
    }
    CropRect {
        x: ((displayed.width - rect.width) / 2.0).max(0.0),
        y: ((displayed.height - rect.height) / 2.0).max(0.0),
        ..rect
    }
}
