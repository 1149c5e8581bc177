//! Editor state: tabs, the live session, effects, and everything that
//! runs in the background.
//!
//! [`Workspace`] is the single owner of mutable editor state. Each field
//! has one writer:
//!
//! | State | Written by |
//! |---|---|
//! | live session (files, crops, selection, tab settings) | workspace methods, fan-out in [`Workspace::tick`] |
//! | saved tab sessions | autosave and tab switching |
//! | effect spec | [`Workspace::set_effects`], [`Workspace::load_effect_settings`] |
//! | jobs | the job runner |
//! | history | the job runner (append), [`Workspace::remove_history`] |
//!
//! Time only advances through [`Workspace::tick`], which pumps the crop
//! synchronizer, fires the tab autosave debounce, and steps export jobs.
//! Edits between ticks mark the live session dirty; the next tick restarts
//! the autosave window.

use crate::cache::RenderCache;
use crate::config::{CropConfig, OcrConfig};
use crate::effects::EffectSpec;
use crate::export::{
    ArtifactSink, ExportEnv, ExportError, ExportJob, ExportKind, ExportOptions, JobEvent, JobId,
    JobRunner, export_individual,
};
use crate::history::{HistoryEntry, HistoryError, HistoryId, HistoryLedger, ManifestEntry};
use crate::imaging::overlay::{OverlayError, OverlayFonts};
use crate::imaging::{ImageBackend, OutputFormat};
use crate::ocr::TextRecognizer;
use crate::render::{RenderError, RenderOutput, Renderer};
use crate::session::{AddReport, CropSize, EditingSession, SessionError};
use crate::settings::{SettingsError, SettingsStore};
use crate::sync::{CropSynchronizer, Debouncer};
use crate::types::{CropPatch, CropRect, ImageFile, ImageIndex};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type TabId = u64;

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("no tab with id {0}")]
    UnknownTab(TabId),
    #[error("the last tab cannot be closed")]
    LastTab,
    #[error("no settings store configured")]
    NoSettingsStore,
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug)]
struct Tab {
    id: TabId,
    saved: EditingSession,
}

/// What one [`Workspace::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records rewritten by a crop fan-out.
    pub fanned_out: usize,
    pub autosaved: bool,
    /// Export jobs with work left after this tick.
    pub jobs_pending: bool,
}

pub struct Workspace<B: ImageBackend> {
    config: CropConfig,
    renderer: Renderer<B>,
    recognizer: Option<Box<dyn TextRecognizer>>,
    sink: Box<dyn ArtifactSink>,
    settings_store: Option<SettingsStore>,

    tabs: Vec<Tab>,
    active: TabId,
    next_tab: TabId,
    live: EditingSession,
    dirty: bool,

    effects: EffectSpec,
    sync: CropSynchronizer,
    autosave: Debouncer<TabId>,
    runner: JobRunner,
    ledger: HistoryLedger,
    cache: RenderCache,
}

impl<B: ImageBackend> Workspace<B> {
    /// One empty tab, `Crop Session 1`. Overlay fonts come from `[fonts]`,
    /// or from the system when `[fonts]` is empty.
    pub fn new(
        backend: B,
        config: CropConfig,
        sink: Box<dyn ArtifactSink>,
    ) -> Result<Self, WorkspaceError> {
        let fonts = OverlayFonts::resolve(&config.fonts)?;
        if !fonts.has_text_font() {
            warn!("no overlay font available, watermark and signature will not render");
        }
        let renderer = Renderer::new(backend, fonts, config.render.clone());
        let live = EditingSession::new("Crop Session 1");
        Ok(Self {
            renderer,
            recognizer: default_recognizer(&config.ocr),
            sink,
            settings_store: None,
            tabs: vec![Tab {
                id: 1,
                saved: live.clone(),
            }],
            active: 1,
            next_tab: 1,
            live,
            dirty: false,
            effects: EffectSpec::default(),
            sync: CropSynchronizer::new(config.sync.window()),
            autosave: Debouncer::new(config.session.window()),
            runner: JobRunner::new(config.pdf.clone(), config.ocr.clone()),
            ledger: HistoryLedger::new(),
            cache: RenderCache::new(),
            config,
        })
    }

    /// Replace the recognizer used for PDF text layers.
    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn has_recognizer(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn with_settings_store(mut self, store: SettingsStore) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn with_events(mut self, tx: Sender<JobEvent>) -> Self {
        self.runner = self.runner.with_events(tx);
        self
    }

    pub fn config(&self) -> &CropConfig {
        &self.config
    }

    /// The session being edited.
    pub fn session(&self) -> &EditingSession {
        &self.live
    }

    // =====================================================================
    // Tabs
    // =====================================================================

    pub fn active_tab(&self) -> TabId {
        self.active
    }

    /// `(id, name)` for every tab, in tab order.
    pub fn tabs(&self) -> Vec<(TabId, &str)> {
        self.tabs
            .iter()
            .map(|t| {
                let name = if t.id == self.active {
                    self.live.name()
                } else {
                    t.saved.name()
                };
                (t.id, name)
            })
            .collect()
    }

    /// Open an empty tab and switch to it.
    pub fn add_tab(&mut self) -> TabId {
        let name = format!("Crop Session {}", self.tabs.len() + 1);
        self.open_tab(EditingSession::new(name))
    }

    fn open_tab(&mut self, session: EditingSession) -> TabId {
        self.next_tab += 1;
        let id = self.next_tab;
        self.tabs.push(Tab { id, saved: session });
        self.activate(id);
        id
    }

    /// Close a tab. Closing the active tab activates the first remaining one.
    pub fn close_tab(&mut self, id: TabId) -> Result<(), WorkspaceError> {
        let pos = self.tab_position(id)?;
        if self.tabs.len() == 1 {
            return Err(WorkspaceError::LastTab);
        }
        self.tabs.remove(pos);
        if id == self.active {
            self.autosave.cancel();
            self.dirty = false;
            let first = self.tabs[0].id;
            self.load_tab(first);
        }
        Ok(())
    }

    /// Blank names are ignored. Returns whether the name changed.
    pub fn rename_tab(&mut self, id: TabId, name: &str) -> Result<bool, WorkspaceError> {
        if id == self.active {
            let renamed = self.live.rename(name);
            self.dirty |= renamed;
            return Ok(renamed);
        }
        let pos = self.tab_position(id)?;
        Ok(self.tabs[pos].saved.rename(name))
    }

    pub fn switch_tab(&mut self, id: TabId) -> Result<(), WorkspaceError> {
        self.tab_position(id)?;
        if id != self.active {
            self.activate(id);
        }
        Ok(())
    }

    fn tab_position(&self, id: TabId) -> Result<usize, WorkspaceError> {
        self.tabs
            .iter()
            .position(|t| t.id == id)
            .ok_or(WorkspaceError::UnknownTab(id))
    }

    /// Save the live session, then make `id` live.
    fn activate(&mut self, id: TabId) {
        self.autosave.cancel();
        self.save_live();
        self.load_tab(id);
    }

    fn load_tab(&mut self, id: TabId) {
        self.cache.clear();
        if let Some(tab) = self.tabs.iter().find(|t| t.id == id) {
            self.live = tab.saved.clone();
        }
        self.sync.teardown(self.live.store_mut());
        self.active = id;
        self.sync.set_lock_mode(self.live.settings().lock_movement);
        debug!(tab = id, name = %self.live.name(), "tab activated");
    }

    fn save_live(&mut self) {
        let active = self.active;
        if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == active) {
            tab.saved = self.live.clone();
        }
        self.dirty = false;
    }

    // =====================================================================
    // Files and crops
    // =====================================================================

    pub fn add_files(&mut self, files: Vec<ImageFile>) -> AddReport {
        let report = self
            .live
            .add_files(files, self.renderer.backend(), &self.config.render);
        self.dirty = true;
        report
    }

    pub fn remove_image(&mut self, index: ImageIndex) -> Result<(), WorkspaceError> {
        let mapping = self.live.remove_image(index)?;
        self.cache.reindex(&mapping);
        self.sync.teardown(self.live.store_mut());
        self.dirty = true;
        Ok(())
    }

    pub fn move_image(&mut self, from: ImageIndex, to: ImageIndex) -> Result<(), WorkspaceError> {
        let mapping = self.live.move_image(from, to)?;
        self.cache.reindex(&mapping);
        self.sync.teardown(self.live.store_mut());
        self.dirty = true;
        Ok(())
    }

    /// User crop edit. In lock mode it fans out on a later tick.
    pub fn update_crop(&mut self, index: ImageIndex, patch: CropPatch) -> Option<CropRect> {
        let stored = self.live.update_crop(index, patch);
        self.dirty |= stored.is_some();
        stored
    }

    pub fn apply_crop_size(&mut self, index: ImageIndex) -> Option<CropRect> {
        let stored = self.live.apply_crop_size(index);
        self.dirty |= stored.is_some();
        stored
    }

    pub fn apply_crop_size_to_all(&mut self) -> usize {
        self.dirty = true;
        self.live.apply_crop_size_to_all()
    }

    // =====================================================================
    // Tab settings and selection
    // =====================================================================

    pub fn set_lock_movement(&mut self, on: bool) {
        self.live.set_lock_movement(on);
        self.sync.set_lock_mode(on);
        self.dirty = true;
    }

    pub fn set_keep_ratio(&mut self, on: bool) {
        self.live.set_keep_ratio(on);
        self.dirty = true;
    }

    pub fn set_center_crop(&mut self, on: bool) {
        self.live.set_center_crop(on);
        self.dirty = true;
    }

    pub fn set_crop_size(&mut self, size: Option<CropSize>) {
        self.live.set_crop_size(size);
        self.dirty = true;
    }

    pub fn set_resize_on_export(&mut self, on: bool) {
        self.live.set_resize_on_export(on);
        self.dirty = true;
    }

    pub fn set_enable_ocr(&mut self, on: bool) {
        self.live.set_enable_ocr(on);
        self.dirty = true;
    }

    pub fn toggle_selected(&mut self, index: ImageIndex) -> bool {
        self.live.toggle_selected(index)
    }

    pub fn select_all(&mut self) {
        self.live.select_all();
    }

    pub fn clear_selection(&mut self) {
        self.live.clear_selection();
    }

    // =====================================================================
    // Effects
    // =====================================================================

    pub fn effects(&self) -> &EffectSpec {
        &self.effects
    }

    /// Replace the effect spec. Adjustments are clamped into range.
    pub fn set_effects(&mut self, mut effects: EffectSpec) {
        effects.adjustments = effects.adjustments.clamped();
        self.effects = effects;
    }

    pub fn reset_adjustments(&mut self) {
        self.effects.reset_adjustments();
    }

    pub fn save_effect_settings(&self) -> Result<(), WorkspaceError> {
        let store = self
            .settings_store
            .as_ref()
            .ok_or(WorkspaceError::NoSettingsStore)?;
        store.save_effects(&self.effects)?;
        info!("effect settings saved");
        Ok(())
    }

    /// Apply the saved effect settings. Returns `false` when nothing was saved.
    pub fn load_effect_settings(&mut self) -> Result<bool, WorkspaceError> {
        let store = self
            .settings_store
            .as_ref()
            .ok_or(WorkspaceError::NoSettingsStore)?;
        match store.load_effects()? {
            Some(effects) => {
                self.set_effects(effects);
                info!("effect settings loaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // =====================================================================
    // Rendering and export
    // =====================================================================

    /// Cached preview of one crop. `None` when the index has no record.
    pub fn preview(
        &mut self,
        index: ImageIndex,
    ) -> Result<Option<Arc<RenderOutput>>, WorkspaceError> {
        let Some(record) = self.live.store().get(index) else {
            return Ok(None);
        };
        let output = self.renderer.render_cached(
            &mut self.cache,
            index,
            record,
            &self.effects,
            None,
            OutputFormat::Png,
        )?;
        Ok(Some(output))
    }

    /// Queue a ZIP or PDF export of the selection (or everything).
    pub fn export(&mut self, kind: ExportKind) -> Result<JobId, WorkspaceError> {
        let indices = self.live.export_indices();
        let options = ExportOptions::for_session(&self.live);
        Ok(self
            .runner
            .submit(kind, &indices, self.live.store(), &self.effects, options)?)
    }

    /// One PNG per selected crop, straight to the sink.
    pub fn export_individual(&mut self) -> Result<Vec<ManifestEntry>, WorkspaceError> {
        let indices = self.live.export_indices();
        Ok(export_individual(
            &self.renderer,
            &indices,
            self.live.store(),
            &self.effects,
            self.live.settings().resize_target(),
            self.sink.as_mut(),
        )?)
    }

    pub fn jobs(&self) -> &[ExportJob] {
        self.runner.jobs()
    }

    pub fn dismiss_job(&mut self, id: JobId) -> Result<ExportJob, WorkspaceError> {
        Ok(self.runner.dismiss(id)?)
    }

    /// Step export jobs until none has work left.
    pub fn run_exports(&mut self) -> usize {
        let env = ExportEnv {
            renderer: &self.renderer,
            recognizer: self.recognizer.as_deref(),
        };
        self.runner
            .run_until_idle(&env, self.sink.as_mut(), &mut self.ledger)
    }

    // =====================================================================
    // History
    // =====================================================================

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.ledger.iter()
    }

    pub fn remove_history(&mut self, id: HistoryId) -> Result<(), WorkspaceError> {
        self.ledger.remove(id)?;
        Ok(())
    }

    /// Reopen a history entry in a new tab and switch to it.
    pub fn restore_history(&mut self, id: HistoryId) -> Result<TabId, WorkspaceError> {
        let session = self.ledger.restore(id)?;
        Ok(self.open_tab(session))
    }

    // =====================================================================
    // Time
    // =====================================================================

    /// Advance background work to `now`.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        report.fanned_out = self.sync.pump(self.live.store_mut(), now);
        if report.fanned_out > 0 {
            self.dirty = true;
        }
        if self.dirty {
            self.autosave.schedule(self.active, now);
            self.dirty = false;
        }
        if let Some(tab) = self.autosave.take_due(now) {
            if tab == self.active {
                self.save_live();
                report.autosaved = true;
                debug!(tab, "tab autosaved");
            }
        }

        let env = ExportEnv {
            renderer: &self.renderer,
            recognizer: self.recognizer.as_deref(),
        };
        report.jobs_pending = self.runner.tick(&env, self.sink.as_mut(), &mut self.ledger);
        report
    }

    /// Whether the live session has edits not yet copied into its tab.
    pub fn has_unsaved_edits(&self) -> bool {
        self.dirty || self.autosave.is_pending()
    }

    /// Cancel every pending debounce. Unsaved tab edits stay only in the
    /// live session.
    pub fn teardown(&mut self) {
        self.sync.teardown(self.live.store_mut());
        self.autosave.cancel();
    }
}

/// The built-in recognizer, when `[ocr]` names all of its models.
#[cfg(feature = "ocr")]
fn default_recognizer(config: &OcrConfig) -> Option<Box<dyn TextRecognizer>> {
    use crate::ocr::{OarRecognizer, OcrError};

    match OarRecognizer::from_config(config) {
        Ok(recognizer) => Some(Box::new(recognizer)),
        Err(OcrError::MissingModel(missing)) => {
            debug!(missing, "built-in OCR not configured");
            None
        }
        Err(e) => {
            warn!(error = %e, "built-in OCR unavailable, PDFs get no text layer");
            None
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn default_recognizer(_config: &OcrConfig) -> Option<Box<dyn TextRecognizer>> {
    None
}
