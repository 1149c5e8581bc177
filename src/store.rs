//! Crop record store.
//!
//! Owns every [`CropRecord`] of one editing session, keyed by image index.
//! There are two write paths:
//!
//! | Path | Used by | Clamps | Queues a [`CropChange`] |
//! |---|---|---|---|
//! | [`CropStore::set`] | user edits | yes | yes |
//! | [`CropStore::set_silent`] | synchronizer fan-out, bulk edits | yes | no |
//!
//! The change queue is how the synchronizer learns about user edits: it
//! drains the queue on its next pump. Silent writes never enter the queue,
//! so a fan-out can't re-trigger itself.

use crate::types::{CropPatch, CropRect, CropRecord, ImageIndex, Size};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("reorder maps more than one image to index {0}")]
    DuplicateTarget(ImageIndex),
}

/// A user edit waiting for the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropChange {
    pub index: ImageIndex,
    pub rect: CropRect,
}

#[derive(Debug, Clone, Default)]
pub struct CropStore {
    records: BTreeMap<ImageIndex, CropRecord>,
    changes: Vec<CropChange>,
}

impl CropStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: ImageIndex) -> Option<&CropRecord> {
        self.records.get(&index)
    }

    pub fn contains(&self, index: ImageIndex) -> bool {
        self.records.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Indices in ascending order.
    pub fn indices(&self) -> Vec<ImageIndex> {
        self.records.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImageIndex, &CropRecord)> {
        self.records.iter().map(|(i, r)| (*i, r))
    }

    /// Insert or replace a record. The rectangle is clamped to the image.
    pub fn insert(&mut self, index: ImageIndex, mut record: CropRecord) -> Option<CropRecord> {
        record.rect = record.rect.clamped_to(record.bounds());
        self.records.insert(index, record)
    }

    /// User write: merge `patch` into the stored rectangle, apply the aspect
    /// lock, clamp, and queue the change for the synchronizer.
    ///
    /// Returns the stored rectangle, or `None` for an unknown index.
    pub fn set(&mut self, index: ImageIndex, patch: CropPatch) -> Option<CropRect> {
        let record = self.records.get_mut(&index)?;
        let mut rect = record.rect;
        if let Some(x) = patch.x {
            rect.x = x;
        }
        if let Some(y) = patch.y {
            rect.y = y;
        }
        if let Some(w) = patch.width {
            rect.width = w;
        }
        if let Some(h) = patch.height {
            rect.height = h;
        }
        if let Some(ratio) = record.aspect_lock.filter(|r| r.is_finite() && *r > 0.0) {
            match (patch.width, patch.height) {
                (Some(w), _) => rect.height = w / ratio,
                (None, Some(h)) => rect.width = h * ratio,
                (None, None) => {}
            }
            if patch.touches_size() {
                rect = fit_locked(rect, record.bounds());
            }
        }
        record.rect = rect.clamped_to(record.bounds());
        let stored = record.rect;
        self.changes.push(CropChange {
            index,
            rect: stored,
        });
        Some(stored)
    }

    /// Silent write: replace the rectangle (clamped) without queueing a change.
    /// The aspect lock and image reference are untouched.
    pub fn set_silent(&mut self, index: ImageIndex, rect: CropRect) -> Option<CropRect> {
        let record = self.records.get_mut(&index)?;
        record.rect = rect.clamped_to(record.bounds());
        Some(record.rect)
    }

    pub fn set_aspect_lock(&mut self, index: ImageIndex, ratio: Option<f64>) -> bool {
        match self.records.get_mut(&index) {
            Some(record) => {
                record.aspect_lock = ratio;
                true
            }
            None => false,
        }
    }

    /// Remove a record. Pending changes for it are discarded.
    pub fn remove(&mut self, index: ImageIndex) -> Option<CropRecord> {
        self.changes.retain(|c| c.index != index);
        self.records.remove(&index)
    }

    /// Total remap of the keyspace.
    ///
    /// Every old index found in `mapping` moves to its new index; old indices
    /// missing from `mapping` are dropped. A mapping that sends two images to
    /// the same index is rejected and the store is left untouched.
    pub fn reindex_after_reorder(
        &mut self,
        mapping: &HashMap<ImageIndex, ImageIndex>,
    ) -> Result<(), StoreError> {
        let mut seen = HashSet::new();
        let mut targets: Vec<ImageIndex> = mapping.values().copied().collect();
        targets.sort_unstable();
        for target in targets {
            if !seen.insert(target) {
                return Err(StoreError::DuplicateTarget(target));
            }
        }

        let old = std::mem::take(&mut self.records);
        self.records = old
            .into_iter()
            .filter_map(|(index, record)| mapping.get(&index).map(|&new| (new, record)))
            .collect();
        self.changes = std::mem::take(&mut self.changes)
            .into_iter()
            .filter_map(|c| {
                mapping.get(&c.index).map(|&new| CropChange {
                    index: new,
                    rect: c.rect,
                })
            })
            .collect();
        Ok(())
    }

    /// Hand every queued user change to the caller, oldest first.
    pub fn drain_changes(&mut self) -> Vec<CropChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    // =====================================================================
    // Bulk edits (silent)
    // =====================================================================

    /// Give every record the same size, keeping each origin. Returns the
    /// number of records touched.
    pub fn apply_size_to_all(&mut self, size: Size) -> usize {
        for record in self.records.values_mut() {
            let rect = CropRect {
                width: size.width,
                height: size.height,
                ..record.rect
            };
            record.rect = rect.clamped_to(record.bounds());
        }
        self.records.len()
    }

    /// Center every crop inside its image.
    pub fn center_all(&mut self) -> usize {
        for record in self.records.values_mut() {
            let bounds = record.bounds();
            let rect = CropRect {
                x: ((bounds.width - record.rect.width) / 2.0).max(0.0),
                y: ((bounds.height - record.rect.height) / 2.0).max(0.0),
                ..record.rect
            };
            record.rect = rect.clamped_to(bounds);
        }
        self.records.len()
    }

    pub fn set_aspect_lock_all(&mut self, ratio: Option<f64>) {
        for record in self.records.values_mut() {
            record.aspect_lock = ratio;
        }
    }
}

/// Shrink both sides by the same factor until the rectangle fits `bounds`,
/// so a locked ratio survives clamping.
fn fit_locked(rect: CropRect, bounds: Size) -> CropRect {
    if !(rect.width > 0.0 && rect.height > 0.0) {
        return rect;
    }
    let scale = (bounds.width / rect.width)
        .min(bounds.height / rect.height)
        .min(1.0);
    if scale <= 0.0 || !scale.is_finite() {
        return rect;
    }
    CropRect {
        width: rect.width * scale,
        height: rect.height * scale,
        ..rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn three_images() -> CropStore {
        store_with(&[(200, 100), (300, 300), (100, 80)])
    }

    // =========================================================================
    // set / set_silent
    // =========================================================================

    #[test]
    fn set_preserves_fields_not_in_patch() {
        let mut store = three_images();
        store.set_silent(0, CropRect::new(5.0, 6.0, 50.0, 40.0));

        store.set(0, CropPatch::position(20.0, 30.0));
        assert_eq!(store.get(0).unwrap().rect, CropRect::new(20.0, 30.0, 50.0, 40.0));
    }

    #[test]
    fn set_clamps_to_displayed_bounds() {
        let mut store = three_images();
        let stored = store.set(2, CropPatch::rect(CropRect::new(90.0, 70.0, 50.0, 50.0)));
        assert_eq!(stored, Some(CropRect::new(50.0, 30.0, 50.0, 50.0)));
    }

    #[test]
    fn set_unknown_index_is_noop() {
        let mut store = three_images();
        assert_eq!(store.set(9, CropPatch::position(1.0, 1.0)), None);
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn set_queues_change_but_silent_does_not() {
        let mut store = three_images();
        store.set_silent(1, CropRect::new(1.0, 1.0, 10.0, 10.0));
        assert!(!store.has_pending_changes());

        store.set(1, CropPatch::position(2.0, 2.0));
        let changes = store.drain_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].index, 1);
        assert_eq!(changes[0].rect, CropRect::new(2.0, 2.0, 10.0, 10.0));
        assert!(store.drain_changes().is_empty());
    }

    #[test]
    fn aspect_lock_follows_width() {
        let mut store = three_images();
        store.set_aspect_lock(1, Some(1.0));
        store.set(1, CropPatch {
            width: Some(120.0),
            ..CropPatch::default()
        });
        let rect = store.get(1).unwrap().rect;
        assert_eq!((rect.width, rect.height), (120.0, 120.0));
    }

    #[test]
    fn aspect_lock_follows_height() {
        let mut store = three_images();
        store.set_aspect_lock(1, Some(2.0));
        store.set(1, CropPatch {
            height: Some(50.0),
            ..CropPatch::default()
        });
        let rect = store.get(1).unwrap().rect;
        assert_eq!((rect.width, rect.height), (100.0, 50.0));
    }

    #[test]
    fn aspect_lock_holds_at_image_edge() {
        let mut store = three_images();
        store.set_aspect_lock(2, Some(1.0));
        store.set(2, CropPatch {
            width: Some(100.0),
            ..CropPatch::default()
        });
        let rect = store.get(2).unwrap().rect;
        assert_eq!((rect.width, rect.height), (80.0, 80.0));
    }

    #[test]
    fn aspect_lock_holds_when_height_overflows() {
        let mut store = three_images();
        store.set_aspect_lock(0, Some(0.5));
        store.set(0, CropPatch {
            height: Some(200.0),
            ..CropPatch::default()
        });
        let rect = store.get(0).unwrap().rect;
        assert_eq!((rect.width, rect.height), (50.0, 100.0));
    }

    #[test]
    fn aspect_lock_ignored_on_move() {
        let mut store = three_images();
        store.set_silent(1, CropRect::new(0.0, 0.0, 80.0, 20.0));
        store.set_aspect_lock(1, Some(1.0));
        store.set(1, CropPatch::position(10.0, 10.0));
        let rect = store.get(1).unwrap().rect;
        assert_eq!((rect.width, rect.height), (80.0, 20.0));
    }

    #[test]
    fn silent_write_keeps_lock_and_image() {
        let mut store = three_images();
        store.set_aspect_lock(0, Some(1.5));
        let image = store.get(0).unwrap().image.clone();
        store.set_silent(0, CropRect::new(0.0, 0.0, 10.0, 10.0));

        let record = store.get(0).unwrap();
        assert_eq!(record.aspect_lock, Some(1.5));
        assert!(std::sync::Arc::ptr_eq(&record.image, &image));
    }

    // =========================================================================
    // remove / reindex
    // =========================================================================

    #[test]
    fn remove_then_reindex_shifts_later_records_down() {
        let mut store = three_images();
        let moved_name = store.get(2).unwrap().name.clone();
        store.remove(1);
        store
            .reindex_after_reorder(&HashMap::from([(0, 0), (2, 1)]))
            .unwrap();

        assert_eq!(store.indices(), vec![0, 1]);
        assert_eq!(store.get(1).unwrap().name, moved_name);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn reindex_is_total_and_keeps_contents() {
        let mut store = three_images();
        store.set_silent(0, CropRect::new(3.0, 4.0, 20.0, 20.0));
        let before = store.get(0).unwrap().rect;

        store
            .reindex_after_reorder(&HashMap::from([(0, 2), (1, 0), (2, 1)]))
            .unwrap();

        assert_eq!(store.indices(), vec![0, 1, 2]);
        assert_eq!(store.get(2).unwrap().rect, before);
        assert_eq!(store.get(2).unwrap().name, "img_0.png");
    }

    #[test]
    fn reindex_drops_unmapped_indices() {
        let mut store = three_images();
        store.reindex_after_reorder(&HashMap::from([(1, 0)])).unwrap();
        assert_eq!(store.indices(), vec![0]);
        assert_eq!(store.get(0).unwrap().name, "img_1.png");
    }

    #[test]
    fn reindex_rejects_duplicate_targets() {
        let mut store = three_images();
        let err = store
            .reindex_after_reorder(&HashMap::from([(0, 1), (2, 1)]))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateTarget(1));
        assert_eq!(store.indices(), vec![0, 1, 2]);
        assert_eq!(store.get(0).unwrap().name, "img_0.png");
    }

    #[test]
    fn reindex_remaps_pending_changes() {
        let mut store = three_images();
        store.set(2, CropPatch::position(1.0, 1.0));
        store.set(1, CropPatch::position(1.0, 1.0));
        store.remove(1);
        store
            .reindex_after_reorder(&HashMap::from([(0, 0), (2, 1)]))
            .unwrap();

        let changes = store.drain_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].index, 1);
    }

    // =========================================================================
    // Bulk edits
    // =========================================================================

    #[test]
    fn apply_size_to_all_clamps_per_image() {
        let mut store = three_images();
        assert_eq!(store.apply_size_to_all(Size { width: 150.0, height: 90.0 }), 3);

        assert_eq!(store.get(0).unwrap().rect.width, 150.0);
        assert_eq!(store.get(2).unwrap().rect.width, 100.0);
        assert_eq!(store.get(2).unwrap().rect.height, 80.0);
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn center_all_centers_each_crop() {
        let mut store = three_images();
        store.apply_size_to_all(Size { width: 50.0, height: 50.0 });
        store.center_all();

        assert_eq!(store.get(0).unwrap().rect, CropRect::new(75.0, 25.0, 50.0, 50.0));
        assert_eq!(store.get(1).unwrap().rect, CropRect::new(125.0, 125.0, 50.0, 50.0));
    }

    #[test]
    fn aspect_lock_all() {
        let mut store = three_images();
        store.set_aspect_lock_all(Some(1.0));
        assert!(store.iter().all(|(_, r)| r.aspect_lock == Some(1.0)));
        store.set_aspect_lock_all(None);
        assert!(store.iter().all(|(_, r)| r.aspect_lock.is_none()));
    }
}
