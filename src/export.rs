//! Batch export jobs.
//!
//! A job renders a list of crops into one artifact: a ZIP archive of PNGs or
//! a PDF with one page per crop. Jobs are driven cooperatively:
//!
//! ```text
//! submit()  ──► Pending ──► tick() ──► Running ──► tick() ... ──► Done | Failed
//!                              │ one unit per tick:
//!                              │   render one item (or skip it), or
//!                              │   finalize the artifact and deliver it
//! ```
//!
//! Every unfinished job advances by exactly one unit per [`JobRunner::tick`],
//! in submission order, so concurrent jobs interleave and progress can be
//! observed between items. Nothing is threaded.
//!
//! ## Failure policy
//!
//! | Failure | Effect |
//! |---|---|
//! | no record, nothing to render, render error | item skipped, job continues |
//! | OCR error | page kept without its text layer |
//! | archive/document finalize, sink delivery | job `Failed` |
//!
//! Skipped items still count toward `completed`, so `completed` always
//! reaches `total` before the job leaves `Running`.
//!
//! ## Snapshots
//!
//! The crop records, effect spec and tab settings are copied at submit
//! time. Editing crops while a job runs does not change its output.

use crate::archive::{AssemblyError, ZipAssembler};
use crate::config::{OcrConfig, PdfConfig};
use crate::effects::EffectSpec;
use crate::history::{HistoryEntry, HistoryLedger, ManifestEntry, OutputManifest};
use crate::imaging::{ImageBackend, OutputFormat, Quality};
use crate::naming::{pdf_filename, zip_filename};
use crate::ocr::{TextRecognizer, normalize_text, wrap_lines};
use crate::pdf::PdfAssembler;
use crate::render::{RenderOutput, Renderer};
use crate::session::{EditingSession, TabSettings};
use crate::store::CropStore;
use crate::types::{CropRecord, Dimensions, ImageFile, ImageIndex};
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type JobId = u64;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("nothing selected to export")]
    EmptySelection,
    #[error("no export job with id {0}")]
    UnknownJob(JobId),
    #[error("export job {0} is still running")]
    JobNotFinished(JobId),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("could not deliver artifact: {0}")]
    Sink(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Zip,
    Pdf,
}

impl ExportKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Zip => "ZIP",
            Self::Pdf => "PDF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Observable state of one export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub id: JobId,
    pub kind: ExportKind,
    /// `ZIP Export (3 images)`.
    pub label: String,
    pub total: usize,
    pub completed: usize,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Artifact name when done, error message when failed.
    pub result: Option<String>,
}

/// Progress events, sent in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started {
        job: JobId,
        label: String,
    },
    Progress {
        job: JobId,
        completed: usize,
        total: usize,
    },
    ItemSkipped {
        job: JobId,
        index: ImageIndex,
        reason: String,
    },
    Finished {
        job: JobId,
        status: JobStatus,
        result: Option<String>,
    },
}

// ============================================================================
// Artifact sinks
// ============================================================================

/// Where finished artifacts go.
pub trait ArtifactSink {
    fn deliver(&mut self, name: &str, bytes: &[u8]) -> std::io::Result<()>;
}

/// Keeps artifacts in memory, in delivery order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub artifacts: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest artifact delivered under `name`.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.artifacts
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.as_slice())
    }
}

impl ArtifactSink for MemorySink {
    fn deliver(&mut self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        self.artifacts.push((name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Writes artifacts as files into a directory, creating it if needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `name` must be one plain path component, so every write stays inside
/// the sink directory.
fn plain_file_name(name: &str) -> std::io::Result<&Path> {
    let path = Path::new(name);
    let mut components = path.components();
    let single = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single || name.contains(['/', '\\']) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("artifact name {:?} is not a plain file name", name),
        ));
    }
    Ok(path)
}

impl ArtifactSink for DirectorySink {
    fn deliver(&mut self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        let file_name = plain_file_name(name)?;
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(())
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Per-export inputs besides the selection, records and effects.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Source of the PDF file name.
    pub tab_name: String,
    pub settings: TabSettings,
    /// The session's files, indexed like the store. Copied into history.
    pub sources: Vec<ImageFile>,
    /// Dates the artifact name.
    pub requested_at: DateTime<Utc>,
}

impl ExportOptions {
    pub fn new(tab_name: impl Into<String>) -> Self {
        Self {
            tab_name: tab_name.into(),
            settings: TabSettings::default(),
            sources: Vec::new(),
            requested_at: Utc::now(),
        }
    }

    pub fn for_session(session: &EditingSession) -> Self {
        Self {
            tab_name: session.name().to_string(),
            settings: session.settings().clone(),
            sources: session.files().to_vec(),
            requested_at: Utc::now(),
        }
    }
}

/// Collaborators a job needs while it runs.
pub struct ExportEnv<'a, B: ImageBackend> {
    pub renderer: &'a Renderer<B>,
    /// `None` means PDFs never get a text layer.
    pub recognizer: Option<&'a dyn TextRecognizer>,
}

#[derive(Debug, Clone)]
struct ExportItem {
    index: ImageIndex,
    record: Option<CropRecord>,
    file: Option<ImageFile>,
}

#[derive(Debug)]
enum Assembly {
    Zip(ZipAssembler),
    Pdf {
        document: PdfAssembler,
        quality: Quality,
        ocr: OcrConfig,
    },
}

#[derive(Debug)]
struct ExportTask {
    job_id: JobId,
    items: Vec<ExportItem>,
    cursor: usize,
    effects: EffectSpec,
    options: ExportOptions,
    assembly: Assembly,
    manifest: Vec<ManifestEntry>,
}

type Events = Option<Sender<JobEvent>>;

fn emit(events: &Events, event: JobEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Owns the active jobs and steps them.
#[derive(Debug)]
pub struct JobRunner {
    jobs: Vec<ExportJob>,
    tasks: Vec<ExportTask>,
    next_id: JobId,
    pdf: PdfConfig,
    ocr: OcrConfig,
    events: Events,
}

impl JobRunner {
    pub fn new(pdf: PdfConfig, ocr: OcrConfig) -> Self {
        Self {
            jobs: Vec::new(),
            tasks: Vec::new(),
            next_id: 0,
            pdf,
            ocr,
            events: None,
        }
    }

    /// Send [`JobEvent`]s to `tx` from now on.
    pub fn with_events(mut self, tx: Sender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Active jobs, oldest first. Finished jobs stay until dismissed.
    pub fn jobs(&self) -> &[ExportJob] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&ExportJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// No job has work left.
    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Queue an export of `selected`, processed in the given order.
    ///
    /// Records are looked up and copied now; an index without a record is
    /// kept and skipped when its turn comes.
    pub fn submit(
        &mut self,
        kind: ExportKind,
        selected: &[ImageIndex],
        store: &CropStore,
        effects: &EffectSpec,
        options: ExportOptions,
    ) -> Result<JobId, ExportError> {
        if selected.is_empty() {
            return Err(ExportError::EmptySelection);
        }
        self.next_id += 1;
        let id = self.next_id;

        let items: Vec<ExportItem> = selected
            .iter()
            .map(|&index| ExportItem {
                index,
                record: store.get(index).cloned(),
                file: options.sources.get(index).cloned(),
            })
            .collect();
        let assembly = match kind {
            ExportKind::Zip => Assembly::Zip(ZipAssembler::new()),
            ExportKind::Pdf => Assembly::Pdf {
                document: PdfAssembler::new(self.pdf.clone(), self.ocr.clone()),
                quality: Quality::new(self.pdf.jpeg_quality),
                ocr: self.ocr.clone(),
            },
        };

        let job = ExportJob {
            id,
            kind,
            label: format!("{} Export ({} images)", kind.label(), items.len()),
            total: items.len(),
            completed: 0,
            status: JobStatus::Pending,
            created_at: options.requested_at,
            result: None,
        };
        debug!(job = id, kind = kind.label(), total = job.total, "export queued");
        self.jobs.push(job);
        self.tasks.push(ExportTask {
            job_id: id,
            items,
            cursor: 0,
            effects: effects.clone(),
            options,
            assembly,
            manifest: Vec::new(),
        });
        Ok(id)
    }

    /// Advance every unfinished job by one unit. Returns whether any job
    /// still has work left.
    pub fn tick<B: ImageBackend>(
        &mut self,
        env: &ExportEnv<'_, B>,
        sink: &mut dyn ArtifactSink,
        ledger: &mut HistoryLedger,
    ) -> bool {
        let mut remaining = Vec::with_capacity(self.tasks.len());
        for mut task in std::mem::take(&mut self.tasks) {
            let Some(job) = self.jobs.iter_mut().find(|j| j.id == task.job_id) else {
                continue;
            };
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
                info!(job = job.id, label = %job.label, "export started");
                emit(
                    &self.events,
                    JobEvent::Started {
                        job: job.id,
                        label: job.label.clone(),
                    },
                );
            }
            if task.cursor < task.items.len() {
                task.step_item(job, env, &self.events);
                remaining.push(task);
            } else {
                task.finish(job, sink, ledger, &self.events);
            }
        }
        self.tasks = remaining;
        !self.tasks.is_empty()
    }

    /// Tick until every job is done or failed. Returns the number of ticks.
    pub fn run_until_idle<B: ImageBackend>(
        &mut self,
        env: &ExportEnv<'_, B>,
        sink: &mut dyn ArtifactSink,
        ledger: &mut HistoryLedger,
    ) -> usize {
        let mut ticks = 0;
        while !self.is_idle() {
            self.tick(env, sink, ledger);
            ticks += 1;
        }
        ticks
    }

    /// Remove a finished job from the active list.
    pub fn dismiss(&mut self, id: JobId) -> Result<ExportJob, ExportError> {
        let pos = self
            .jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(ExportError::UnknownJob(id))?;
        if !self.jobs[pos].status.is_terminal() {
            return Err(ExportError::JobNotFinished(id));
        }
        Ok(self.jobs.remove(pos))
    }
}

impl ExportTask {
    fn step_item<B: ImageBackend>(
        &mut self,
        job: &mut ExportJob,
        env: &ExportEnv<'_, B>,
        events: &Events,
    ) {
        let item = &self.items[self.cursor];
        self.cursor += 1;

        let resize_target = self.options.settings.resize_target();
        let enable_ocr = self.options.settings.enable_ocr;
        match export_item(item, &self.effects, resize_target, enable_ocr, &mut self.assembly, env) {
            Ok(entry) => self.manifest.push(entry),
            Err(reason) => {
                warn!(job = job.id, index = item.index, %reason, "export item skipped");
                emit(
                    events,
                    JobEvent::ItemSkipped {
                        job: job.id,
                        index: item.index,
                        reason,
                    },
                );
            }
        }

        job.completed += 1;
        emit(
            events,
            JobEvent::Progress {
                job: job.id,
                completed: job.completed,
                total: job.total,
            },
        );
    }

    fn finish(
        self,
        job: &mut ExportJob,
        sink: &mut dyn ArtifactSink,
        ledger: &mut HistoryLedger,
        events: &Events,
    ) {
        let job_id = job.id;
        let kind = job.kind;
        let total = job.total;
        let created_at = job.created_at;

        let artifact = match &self.assembly {
            Assembly::Zip(_) => zip_filename(created_at),
            Assembly::Pdf { .. } => pdf_filename(&self.options.tab_name, created_at),
        };
        let delivered = match self.assembly {
            Assembly::Zip(zip) => zip.finish(),
            Assembly::Pdf { document, .. } => document.finish(),
        }
        .map_err(ExportError::from)
        .and_then(|bytes| sink.deliver(&artifact, &bytes).map_err(ExportError::from));

        match delivered {
            Ok(()) => {
                job.status = JobStatus::Done;
                job.result = Some(artifact.clone());
                info!(job = job_id, %artifact, items = self.manifest.len(), "export done");

                let (sources, crop_snapshot) = history_snapshot(self.items);
                ledger.append(HistoryEntry {
                    id: 0,
                    label: format!("{} Export - {} images", kind.label(), total),
                    created_at,
                    sources,
                    crop_snapshot,
                    effect_snapshot: self.effects,
                    settings_snapshot: self.options.settings,
                    output_manifest: OutputManifest {
                        kind,
                        artifact,
                        items: self.manifest,
                    },
                });
            }
            Err(e) => {
                warn!(job = job_id, error = %e, "export failed");
                job.status = JobStatus::Failed;
                job.result = Some(e.to_string());
            }
        }
        emit(
            events,
            JobEvent::Finished {
                job: job_id,
                status: job.status,
                result: job.result.clone(),
            },
        );
    }
}

/// Render one item into the assembly. `Err` carries the skip reason.
fn export_item<B: ImageBackend>(
    item: &ExportItem,
    effects: &EffectSpec,
    resize_target: Option<(u32, u32)>,
    enable_ocr: bool,
    assembly: &mut Assembly,
    env: &ExportEnv<'_, B>,
) -> Result<ManifestEntry, String> {
    let record = item.record.as_ref().ok_or("no crop record")?;
    let format = match assembly {
        Assembly::Zip(_) => OutputFormat::Png,
        Assembly::Pdf { quality, .. } => OutputFormat::Jpeg(*quality),
    };
    let output = env
        .renderer
        .render(item.index, record, effects, resize_target, format)
        .map_err(|e| e.to_string())?;
    if output.is_empty() {
        return Err("nothing to render".to_string());
    }
    let RenderOutput {
        pixels,
        encoded,
        suggested_filename,
        fingerprint,
        ..
    } = output;

    match assembly {
        Assembly::Zip(zip) => {
            zip.add(&suggested_filename, encoded);
        }
        Assembly::Pdf { document, ocr, .. } => {
            let pixels = pixels.ok_or("render produced no pixels")?;
            let lines = match (enable_ocr, env.recognizer) {
                (true, Some(recognizer)) => match recognizer.recognize(&pixels, &ocr.language) {
                    Ok(text) => wrap_lines(&normalize_text(&text), ocr.line_chars),
                    Err(e) => {
                        warn!(index = item.index, error = %e, "OCR failed, page has no text layer");
                        Vec::new()
                    }
                },
                _ => Vec::new(),
            };
            let dims = Dimensions {
                width: pixels.width(),
                height: pixels.height(),
            };
            document.add_page(encoded, dims, lines);
        }
    }
    Ok(ManifestEntry {
        index: item.index,
        filename: suggested_filename,
        fingerprint,
    })
}

/// Files and records of every item that had a record, in export order.
fn history_snapshot(items: Vec<ExportItem>) -> (Vec<ImageFile>, Vec<CropRecord>) {
    items
        .into_iter()
        .filter_map(|item| {
            let record = item.record?;
            let file = item.file.unwrap_or_else(|| {
                ImageFile::new(record.name.clone(), "application/octet-stream", Vec::new())
            });
            Some((file, record))
        })
        .unzip()
}

// ============================================================================
// Individual export
// ============================================================================

/// Export each selected crop as its own PNG. No job, no history.
///
/// Items without a record or with nothing to render are skipped; a sink
/// failure stops the export.
pub fn export_individual<B: ImageBackend>(
    renderer: &Renderer<B>,
    selected: &[ImageIndex],
    store: &CropStore,
    effects: &EffectSpec,
    resize_target: Option<(u32, u32)>,
    sink: &mut dyn ArtifactSink,
) -> Result<Vec<ManifestEntry>, ExportError> {
    if selected.is_empty() {
        return Err(ExportError::EmptySelection);
    }
    let mut written = Vec::new();
    for &index in selected {
        let Some(record) = store.get(index) else {
            debug!(index, "no crop record, skipped");
            continue;
        };
        let rendered = renderer.render(index, record, effects, resize_target, OutputFormat::Png);
        let output = match rendered {
            Ok(o) if !o.is_empty() => o,
            Ok(_) => {
                debug!(index, "nothing to render, skipped");
                continue;
            }
            Err(e) => {
                warn!(index, error = %e, "render failed, skipped");
                continue;
            }
        };
        sink.deliver(&output.suggested_filename, &output.encoded)?;
        written.push(ManifestEntry {
            index,
            filename: output.suggested_filename,
            fingerprint: output.fingerprint,
        });
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::overlay::OverlayFonts;
    use crate::imaging::RustBackend;
    use crate::ocr::{FixedText, OcrError};
    use crate::test_helpers::*;
    use crate::types::{CropPatch, CropRect};
    use chrono::TimeZone;
    use image::RgbaImage;
    use lopdf::Document;
    use std::cell::Cell;
    use std::io::{Cursor, Read};
    use std::sync::mpsc;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn renderer<B: ImageBackend>(backend: B) -> Renderer<B> {
        Renderer::new(backend, OverlayFonts::none(), RenderConfig::default())
    }

    fn runner() -> JobRunner {
        JobRunner::new(PdfConfig::default(), OcrConfig::default())
    }

    fn options(tab: &str) -> ExportOptions {
        ExportOptions {
            requested_at: Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap(),
            ..ExportOptions::new(tab)
        }
    }

    fn zip_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn zip_entry(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        content
    }

    struct FailingOcr;

    impl TextRecognizer for FailingOcr {
        fn recognize(&self, _image: &RgbaImage, _language: &str) -> Result<String, OcrError> {
            Err(OcrError::Failed("engine crashed".into()))
        }
    }

    #[derive(Default)]
    struct CountingOcr {
        calls: Cell<usize>,
    }

    impl TextRecognizer for CountingOcr {
        fn recognize(&self, _image: &RgbaImage, _language: &str) -> Result<String, OcrError> {
            self.calls.set(self.calls.get() + 1);
            Ok("counted".into())
        }
    }

    struct BrokenSink;

    impl ArtifactSink for BrokenSink {
        fn deliver(&mut self, _name: &str, _bytes: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    // =========================================================================
    // Submission
    // =========================================================================

    #[test]
    fn empty_selection_creates_no_job() {
        let mut r = runner();
        let store = store_with(&[(20, 20)]);
        let result = r.submit(ExportKind::Zip, &[], &store, &EffectSpec::default(), options("t"));
        assert!(matches!(result, Err(ExportError::EmptySelection)));
        assert!(r.jobs().is_empty());
    }

    #[test]
    fn submitted_job_is_pending_with_label() {
        let mut r = runner();
        let store = store_with(&[(20, 20), (20, 20)]);
        let id = r
            .submit(ExportKind::Zip, &[0, 1], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        let job = r.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.label, "ZIP Export (2 images)");
        assert_eq!((job.completed, job.total), (0, 2));
    }

    // =========================================================================
    // ZIP jobs
    // =========================================================================

    #[test]
    fn zip_job_exports_selection_in_order() {
        let mut r = runner();
        let store = store_with(&[(20, 20), (30, 20), (20, 30)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut sink = MemorySink::new();
        let mut ledger = HistoryLedger::new();

        let id = r
            .submit(ExportKind::Zip, &[2, 0], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        r.run_until_idle(&env, &mut sink, &mut ledger);

        let job = r.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.completed, 2);
        assert_eq!(job.result.as_deref(), Some("cropped_images_2026-03-14.zip"));

        let bytes = sink.get("cropped_images_2026-03-14.zip").unwrap();
        assert_eq!(zip_names(bytes), vec!["img_2.png", "img_0.png"]);
        assert_eq!(&zip_entry(bytes, "img_0.png")[..4], b"\x89PNG");
    }

    #[test]
    fn zip_job_appends_history() {
        let mut r = runner();
        let store = store_with(&[(20, 20), (20, 20), (20, 20)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut ledger = HistoryLedger::new();
        let fx = EffectSpec {
            filter: crate::effects::FilterPreset::Warm,
            ..EffectSpec::default()
        };

        r.submit(ExportKind::Zip, &[1, 2], &store, &fx, options("t")).unwrap();
        r.run_until_idle(&env, &mut MemorySink::new(), &mut ledger);

        let entry = ledger.iter().next().unwrap();
        assert_eq!(entry.label, "ZIP Export - 2 images");
        assert_eq!(entry.crop_snapshot.len(), 2);
        assert_eq!(entry.sources.len(), 2);
        assert_eq!(entry.crop_snapshot[0].name, "img_1.png");
        assert_eq!(entry.effect_snapshot, fx);
        assert_eq!(entry.output_manifest.kind, ExportKind::Zip);
        assert_eq!(entry.output_manifest.items.len(), 2);
        assert_eq!(entry.output_manifest.items[1].index, 2);
    }

    #[test]
    fn progress_is_published_after_every_item() {
        let (tx, rx) = mpsc::channel();
        let mut r = runner().with_events(tx);
        let store = store_with(&[(20, 20), (20, 20)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };

        let id = r
            .submit(ExportKind::Zip, &[0, 5, 1], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        r.run_until_idle(&env, &mut MemorySink::new(), &mut HistoryLedger::new());
        drop(r);

        let events: Vec<JobEvent> = rx.iter().collect();
        assert!(matches!(events.first(), Some(JobEvent::Started { .. })));
        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![1, 2, 3]);
        assert!(events.contains(&JobEvent::ItemSkipped {
            job: id,
            index: 5,
            reason: "no crop record".into(),
        }));
        assert_eq!(
            events.last(),
            Some(&JobEvent::Finished {
                job: id,
                status: JobStatus::Done,
                result: Some("cropped_images_2026-03-14.zip".into()),
            })
        );
    }

    #[test]
    fn render_failures_skip_items_but_job_completes() {
        let mut r = runner();
        let store = store_with(&[(20, 20), (20, 20)]);
        let render = renderer(MockBackend::failing_encode());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut sink = MemorySink::new();

        let id = r
            .submit(ExportKind::Zip, &[0, 1], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        r.run_until_idle(&env, &mut sink, &mut HistoryLedger::new());

        let job = r.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.completed, 2);
        assert!(zip_names(sink.get("cropped_images_2026-03-14.zip").unwrap()).is_empty());
    }

    #[test]
    fn duplicate_names_collapse_in_archive() {
        let mut r = runner();
        let mut store = store_with(&[(20, 20), (20, 20)]);
        let mut twin = store.get(1).unwrap().clone();
        twin.name = "img_0.png".into();
        store.insert(1, twin);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut sink = MemorySink::new();

        r.submit(ExportKind::Zip, &[0, 1], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        r.run_until_idle(&env, &mut sink, &mut HistoryLedger::new());

        assert_eq!(
            zip_names(sink.get("cropped_images_2026-03-14.zip").unwrap()),
            vec!["img_0.png"]
        );
    }

    #[test]
    fn sink_failure_fails_job_without_history() {
        let mut r = runner();
        let store = store_with(&[(20, 20)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut ledger = HistoryLedger::new();

        let id = r
            .submit(ExportKind::Zip, &[0], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        r.run_until_idle(&env, &mut BrokenSink, &mut ledger);

        let job = r.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.completed, 1);
        assert!(job.result.as_deref().unwrap().contains("disk full"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn records_are_snapshotted_at_submit() {
        let mut r = runner();
        let mut store = store_with(&[(40, 40)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut ledger = HistoryLedger::new();

        r.submit(ExportKind::Zip, &[0], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        store.set(0, CropPatch::rect(CropRect::new(5.0, 5.0, 10.0, 10.0)));
        store.remove(0);
        r.run_until_idle(&env, &mut MemorySink::new(), &mut ledger);

        let entry = ledger.iter().next().unwrap();
        assert_eq!(entry.output_manifest.items.len(), 1);
        assert_eq!(entry.crop_snapshot[0].rect, CropRect::new(0.0, 0.0, 40.0, 40.0));
    }

    // =========================================================================
    // PDF jobs
    // =========================================================================

    #[test]
    fn pdf_job_names_document_after_tab() {
        let mut r = runner();
        let store = store_with(&[(20, 20), (20, 20)]);
        let render = renderer(RustBackend::new());
        let ocr = FixedText("hello world".into());
        let env = ExportEnv {
            renderer: &render,
            recognizer: Some(&ocr),
        };
        let mut sink = MemorySink::new();
        let mut ledger = HistoryLedger::new();

        let id = r
            .submit(ExportKind::Pdf, &[0, 1], &store, &EffectSpec::default(), options("My Tab #2"))
            .unwrap();
        r.run_until_idle(&env, &mut sink, &mut ledger);

        assert_eq!(r.job(id).unwrap().result.as_deref(), Some("MyTab2_2026-03-14.pdf"));
        let doc = Document::load_mem(sink.get("MyTab2_2026-03-14.pdf").unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
        assert_eq!(ledger.iter().next().unwrap().label, "PDF Export - 2 images");
    }

    #[test]
    fn ocr_failure_keeps_page_without_text() {
        let mut r = runner();
        let store = store_with(&[(20, 20)]);
        let render = renderer(RustBackend::new());
        let ocr = FailingOcr;
        let env = ExportEnv {
            renderer: &render,
            recognizer: Some(&ocr),
        };
        let mut sink = MemorySink::new();

        let id = r
            .submit(ExportKind::Pdf, &[0], &store, &EffectSpec::default(), options("scan"))
            .unwrap();
        r.run_until_idle(&env, &mut sink, &mut HistoryLedger::new());

        assert_eq!(r.job(id).unwrap().status, JobStatus::Done);
        let doc = Document::load_mem(sink.get("scan_2026-03-14.pdf").unwrap()).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let content = doc.get_page_content(pages[&1]).unwrap();
        assert!(!String::from_utf8_lossy(&content).contains("Tj"));
    }

    #[test]
    fn ocr_disabled_never_calls_recognizer() {
        let mut r = runner();
        let store = store_with(&[(20, 20)]);
        let render = renderer(RustBackend::new());
        let ocr = CountingOcr::default();
        let env = ExportEnv {
            renderer: &render,
            recognizer: Some(&ocr),
        };
        let mut opts = options("t");
        opts.settings.enable_ocr = false;

        r.submit(ExportKind::Pdf, &[0], &store, &EffectSpec::default(), opts)
            .unwrap();
        r.run_until_idle(&env, &mut MemorySink::new(), &mut HistoryLedger::new());
        assert_eq!(ocr.calls.get(), 0);
    }

    // =========================================================================
    // Scheduling and dismissal
    // =========================================================================

    #[test]
    fn concurrent_jobs_interleave() {
        let mut r = runner();
        let store = store_with(&[(20, 20), (20, 20), (20, 20)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut sink = MemorySink::new();
        let mut ledger = HistoryLedger::new();

        let a = r
            .submit(ExportKind::Zip, &[0, 1, 2], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        let b = r
            .submit(ExportKind::Zip, &[2, 1], &store, &EffectSpec::default(), options("t"))
            .unwrap();

        assert!(r.tick(&env, &mut sink, &mut ledger));
        assert_eq!(r.job(a).unwrap().completed, 1);
        assert_eq!(r.job(b).unwrap().completed, 1);
        assert_eq!(r.job(a).unwrap().status, JobStatus::Running);

        r.run_until_idle(&env, &mut sink, &mut ledger);
        assert_eq!(r.job(a).unwrap().status, JobStatus::Done);
        assert_eq!(r.job(b).unwrap().status, JobStatus::Done);
        assert_eq!(ledger.len(), 2);
        assert_eq!(sink.artifacts.len(), 2);
    }

    #[test]
    fn finalize_takes_its_own_tick() {
        let mut r = runner();
        let store = store_with(&[(20, 20)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };
        let mut sink = MemorySink::new();
        let mut ledger = HistoryLedger::new();

        let id = r
            .submit(ExportKind::Zip, &[0], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        assert!(r.tick(&env, &mut sink, &mut ledger));
        assert_eq!(r.job(id).unwrap().status, JobStatus::Running);
        assert!(!r.tick(&env, &mut sink, &mut ledger));
        assert_eq!(r.job(id).unwrap().status, JobStatus::Done);
    }

    #[test]
    fn dismiss_only_terminal_jobs() {
        let mut r = runner();
        let store = store_with(&[(20, 20)]);
        let render = renderer(RustBackend::new());
        let env = ExportEnv {
            renderer: &render,
            recognizer: None,
        };

        let id = r
            .submit(ExportKind::Zip, &[0], &store, &EffectSpec::default(), options("t"))
            .unwrap();
        assert!(matches!(r.dismiss(id), Err(ExportError::JobNotFinished(_))));
        assert!(matches!(r.dismiss(99), Err(ExportError::UnknownJob(99))));

        r.run_until_idle(&env, &mut MemorySink::new(), &mut HistoryLedger::new());
        assert_eq!(r.dismiss(id).unwrap().status, JobStatus::Done);
        assert!(r.jobs().is_empty());
    }

    // =========================================================================
    // Individual export and sinks
    // =========================================================================

    #[test]
    fn individual_export_writes_one_png_per_record() {
        let mut store = store_with(&[(20, 20), (20, 20)]);
        let mut unnamed = store.get(1).unwrap().clone();
        unnamed.name.clear();
        store.insert(1, unnamed);
        let mut sink = MemorySink::new();

        let written = export_individual(
            &renderer(RustBackend::new()),
            &[0, 1, 4],
            &store,
            &EffectSpec::default(),
            None,
            &mut sink,
        )
        .unwrap();

        let names: Vec<&str> = written.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["img_0.png", "cropped_002.png"]);
        assert_eq!(sink.artifacts.len(), 2);
    }

    #[test]
    fn directory_sink_writes_files() {
        let tmp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(tmp.path().join("out"));
        sink.deliver("a.zip", b"zip").unwrap();
        assert_eq!(std::fs::read(tmp.path().join("out/a.zip")).unwrap(), b"zip");
    }

    #[test]
    fn directory_sink_refuses_names_that_leave_the_directory() {
        let tmp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(tmp.path().join("out"));
        for name in ["../escape.png", "/tmp/abs.png", "nested/a.png", "..\\win.png", "..", ""] {
            let err = sink.deliver(name, b"x").unwrap_err();
            assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput, "name {:?}", name);
        }
        assert!(!tmp.path().join("escape.png").exists());
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn individual_export_stops_on_traversing_name() {
        let tmp = TempDir::new().unwrap();
        let mut store = CropStore::new();
        store.insert(0, full_record("../outside.png", 20, 20));
        let mut sink = DirectorySink::new(tmp.path().join("out"));
        let result = export_individual(
            &renderer(MockBackend::new()),
            &[0],
            &store,
            &EffectSpec::default(),
            None,
            &mut sink,
        );
        assert!(matches!(result, Err(ExportError::Sink(_))));
        assert!(!tmp.path().join("outside.png").exists());
    }
}
