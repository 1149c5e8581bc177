//! # cropbatch
//!
//! Batch image cropping: load many images, set one crop rectangle per image
//! (optionally moving them all in lockstep), apply visual effects, and export
//! the results as individual PNGs, a ZIP archive, or a multi-page PDF with an
//! optional invisible OCR text layer.
//!
//! # Architecture: Edit → Render → Export
//!
//! ```text
//! 1. Edit     files + crop records      (session, store, sync)
//! 2. Render   record + effects → pixels (render, imaging, cache)
//! 3. Export   snapshot → job → artifact (export, archive, pdf, history)
//! ```
//!
//! Editing never touches pixels beyond decoding; rendering is a pure function
//! of a crop record and an effect spec; exports run against a snapshot taken
//! at submit time, so later edits never leak into a running job.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`workspace`] | Owner of editor state: tabs, live session, effects, jobs, history |
//! | [`session`] | One tab: files, crop records, selection, tab settings |
//! | [`store`] | Crop records keyed by image index, with the clamping invariant |
//! | [`sync`] | Debouncers and the lock-mode crop fan-out |
//! | [`effects`] | Filter presets, adjustment sliders, overlays |
//! | [`render`] | Crop + effects → encoded surface, with resize and pixel ratio |
//! | [`cache`] | Content-addressed preview cache |
//! | [`export`] | Job runner, progress events, artifact sinks |
//! | [`archive`] | ZIP assembly |
//! | [`pdf`] | PDF assembly with invisible text layer |
//! | [`ocr`] | Text recognizer seam and line wrapping |
//! | [`history`] | Completed exports and session restore |
//! | [`settings`] | Persisted effect settings |
//! | [`config`] | `config.toml` loading, validation, and merging |
//! | [`naming`] | Output filename conventions |
//! | [`types`] | Shared geometry, records, and file types |
//! | [`imaging`] | Pure-Rust pixel operations behind [`imaging::ImageBackend`] |
//! | [`output`] | Human-readable formatting of jobs, events, and history |
//!
//! # Design Decisions
//!
//! ## Explicit Time
//!
//! Nothing in the crate reads the clock to decide when to act. Debounced
//! work (crop fan-out, tab autosave) and export steps advance only through
//! [`workspace::Workspace::tick`], which takes the current `Instant`. Tests
//! drive time by hand and never sleep.
//!
//! ## Cooperative Export
//!
//! Export jobs run one item per tick, round-robin across jobs. No threads are
//! spawned; the caller decides how often to tick. Progress is reported as
//! typed [`export::JobEvent`]s over an optional `mpsc` channel.
//!
//! ## Trait Seams
//!
//! Pixel work goes through [`imaging::ImageBackend`], text recognition
//! through [`ocr::TextRecognizer`], and artifact delivery through
//! [`export::ArtifactSink`]. Tests swap in recording or failing
//! implementations without touching the pipeline.

pub mod archive;
pub mod cache;
pub mod config;
pub mod effects;
pub mod export;
pub mod history;
pub mod imaging;
pub mod naming;
pub mod ocr;
pub mod output;
pub mod pdf;
pub mod render;
pub mod session;
pub mod settings;
pub mod store;
pub mod sync;
pub mod types;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Meant for binaries and tests; calling it twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
