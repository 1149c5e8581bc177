//! History of completed exports.
//!
//! Each successful export appends one [`HistoryEntry`] holding everything
//! needed to reopen the work: the source files, the crop records as they
//! were exported, the effect and tab settings, and what was produced.
//! Entries never change after they are appended; they can only be removed.
//!
//! Restoring an entry builds a brand-new [`EditingSession`] from copies of
//! the snapshot, so editing the restored tab never reaches back into the
//! ledger.

use crate::effects::EffectSpec;
use crate::export::ExportKind;
use crate::session::{EditingSession, TabSettings};
use crate::types::{CropRecord, ImageFile, ImageIndex};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

pub type HistoryId = u64;

#[derive(Error, Debug, PartialEq)]
pub enum HistoryError {
    #[error("no history entry with id {0}")]
    NotFound(HistoryId),
}

/// One exported item.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    /// Index of the image in the exporting session.
    pub index: ImageIndex,
    pub filename: String,
    pub fingerprint: String,
}

/// What an export produced.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputManifest {
    pub kind: ExportKind,
    /// Archive or document file name.
    pub artifact: String,
    pub items: Vec<ManifestEntry>,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Assigned by [`HistoryLedger::append`].
    pub id: HistoryId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// One file per entry of `crop_snapshot`, same order.
    pub sources: Vec<ImageFile>,
    pub crop_snapshot: Vec<CropRecord>,
    pub effect_snapshot: EffectSpec,
    pub settings_snapshot: TabSettings,
    pub output_manifest: OutputManifest,
}

/// Newest-first list of history entries.
#[derive(Debug, Default)]
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
    next_id: HistoryId,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry in front and return its id.
    pub fn append(&mut self, mut entry: HistoryEntry) -> HistoryId {
        self.next_id += 1;
        entry.id = self.next_id;
        debug!(id = entry.id, label = %entry.label, "history entry appended");
        self.entries.insert(0, entry);
        self.next_id
    }

    pub fn remove(&mut self, id: HistoryId) -> Result<HistoryEntry, HistoryError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(HistoryError::NotFound(id))?;
        Ok(self.entries.remove(pos))
    }

    pub fn get(&self, id: HistoryId) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// New session named `Restored: <label>` with the snapshot's records
    /// keyed `0..n`.
    pub fn restore(&self, id: HistoryId) -> Result<EditingSession, HistoryError> {
        let entry = self.get(id).ok_or(HistoryError::NotFound(id))?;
        Ok(EditingSession::from_snapshot(
            format!("Restored: {}", entry.label),
            entry.sources.clone(),
            entry.crop_snapshot.clone(),
            entry.settings_snapshot.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use crate::types::{CropPatch, CropRect};
    use chrono::TimeZone;

    fn entry(label: &str) -> HistoryEntry {
        let records = vec![full_record("a.png", 100, 100), full_record("b.png", 50, 50)];
        HistoryEntry {
            id: 0,
            label: label.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
            sources: records
                .iter()
                .map(|r| ImageFile::new(r.name.clone(), "image/png", vec![]))
                .collect(),
            crop_snapshot: records,
            effect_snapshot: EffectSpec::default(),
            settings_snapshot: TabSettings::default(),
            output_manifest: OutputManifest {
                kind: ExportKind::Zip,
                artifact: "cropped_images_2026-03-14.zip".into(),
                items: vec![],
            },
        }
    }

    #[test]
    fn append_is_newest_first_with_fresh_ids() {
        let mut ledger = HistoryLedger::new();
        let first = ledger.append(entry("ZIP Export - 2 images"));
        let second = ledger.append(entry("PDF Export - 2 images"));

        assert_ne!(first, second);
        let labels: Vec<&str> = ledger.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["PDF Export - 2 images", "ZIP Export - 2 images"]);
    }

    #[test]
    fn remove_deletes_only_that_entry() {
        let mut ledger = HistoryLedger::new();
        let a = ledger.append(entry("a"));
        let b = ledger.append(entry("b"));

        assert_eq!(ledger.remove(a).unwrap().label, "a");
        assert_eq!(ledger.remove(a).unwrap_err(), HistoryError::NotFound(a));
        assert!(ledger.get(b).is_some());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn restore_builds_named_session() {
        let mut ledger = HistoryLedger::new();
        let id = ledger.append(entry("ZIP Export - 2 images"));

        let session = ledger.restore(id).unwrap();
        assert_eq!(session.name(), "Restored: ZIP Export - 2 images");
        assert_eq!(session.files().len(), 2);
        assert_eq!(session.store().get(1).unwrap().name, "b.png");
    }

    #[test]
    fn restored_session_edits_do_not_touch_ledger() {
        let mut ledger = HistoryLedger::new();
        let id = ledger.append(entry("x"));

        let mut session = ledger.restore(id).unwrap();
        session.set_keep_ratio(false);
        session.update_crop(0, CropPatch::rect(CropRect::new(5.0, 5.0, 10.0, 10.0)));
        session.remove_image(1).unwrap();

        let stored = ledger.get(id).unwrap();
        assert_eq!(stored.crop_snapshot.len(), 2);
        assert_eq!(stored.crop_snapshot[0].rect, CropRect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn restore_unknown_id_fails() {
        assert_eq!(
            HistoryLedger::new().restore(9).unwrap_err(),
            HistoryError::NotFound(9)
        );
    }
}
