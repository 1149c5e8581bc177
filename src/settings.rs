//! Persisted effect settings.
//!
//! A directory-backed key/value store with named slots. Each slot is one
//! pretty-printed JSON file (`<dir>/<slot>.json`). The editor uses a single
//! slot, [`SAVED_ADJUSTMENTS`], holding the last-saved [`EffectSpec`].
//!
//! Loading is always an explicit call; constructing a store reads nothing.

use crate::effects::EffectSpec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Slot holding the last-saved effect settings.
pub const SAVED_ADJUSTMENTS: &str = "saved-adjustments";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings slot '{slot}' is corrupt: {source}")]
    Corrupt {
        slot: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid slot name '{0}'")]
    InvalidSlot(String),
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot: &str) -> Result<PathBuf, SettingsError> {
        let valid = !slot.is_empty()
            && slot
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SettingsError::InvalidSlot(slot.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", slot)))
    }

    /// Write a value into a slot, creating the directory if needed.
    pub fn save<T: Serialize>(&self, slot: &str, value: &T) -> Result<(), SettingsError> {
        let path = self.slot_path(slot)?;
        let json = serde_json::to_string_pretty(value)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, json)?;
        debug!(slot, path = %path.display(), "settings saved");
        Ok(())
    }

    /// Read a slot. A missing slot is `Ok(None)`; unparseable content is an error.
    pub fn load<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>, SettingsError> {
        let path = self.slot_path(slot)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| SettingsError::Corrupt {
                slot: slot.to_string(),
                source,
            })
    }

    /// Delete a slot. Returns whether it existed.
    pub fn clear(&self, slot: &str) -> Result<bool, SettingsError> {
        let path = self.slot_path(slot)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_effects(&self, effects: &EffectSpec) -> Result<(), SettingsError> {
        self.save(SAVED_ADJUSTMENTS, effects)
    }

    pub fn load_effects(&self) -> Result<Option<EffectSpec>, SettingsError> {
        self.load(SAVED_ADJUSTMENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Adjustments, FilterPreset};
    use tempfile::TempDir;

    #[test]
    fn missing_slot_loads_none() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::new(tmp.path());
        assert!(store.load_effects().unwrap().is_none());
    }

    #[test]
    fn effects_survive_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::new(tmp.path().join("nested"));
        let mut fx = EffectSpec {
            filter: FilterPreset::Moonlight,
            adjustments: Adjustments {
                contrast: 25.0,
                sharpen: 40.0,
                ..Adjustments::default()
            },
            ..EffectSpec::default()
        };
        fx.overlays.signature.enabled = true;
        fx.overlays.signature.text = "J. Doe".into();

        store.save_effects(&fx).unwrap();
        assert!(tmp.path().join("nested/saved-adjustments.json").exists());
        assert_eq!(store.load_effects().unwrap(), Some(fx));
    }

    #[test]
    fn saved_file_is_pretty_json() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::new(tmp.path());
        store.save_effects(&EffectSpec::default()).unwrap();

        let content = std::fs::read_to_string(tmp.path().join("saved-adjustments.json")).unwrap();
        assert!(content.contains("\n  \"filter\": \"none\""));
    }

    #[test]
    fn corrupt_slot_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("saved-adjustments.json"), "{not json").unwrap();
        let store = SettingsStore::new(tmp.path());
        assert!(matches!(
            store.load_effects(),
            Err(SettingsError::Corrupt { .. })
        ));
    }

    #[test]
    fn clear_removes_slot() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::new(tmp.path());
        store.save_effects(&EffectSpec::default()).unwrap();

        assert!(store.clear(SAVED_ADJUSTMENTS).unwrap());
        assert!(!store.clear(SAVED_ADJUSTMENTS).unwrap());
        assert!(store.load_effects().unwrap().is_none());
    }

    #[test]
    fn slot_names_are_restricted() {
        let tmp = TempDir::new().unwrap();
        let store = SettingsStore::new(tmp.path());
        assert!(matches!(
            store.save("../escape", &1),
            Err(SettingsError::InvalidSlot(_))
        ));
        assert!(store.load::<u32>("").is_err());
    }
}
