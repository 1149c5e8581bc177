//! Human-readable formatting for jobs, job events, and history.
//!
//! # Display Contract
//!
//! Every entity leads with its label. Progress and results follow on the
//! same line for jobs, and as indented context lines for history entries:
//!
//! ## Jobs
//!
//! ```text
//! ZIP Export (2 images)  1/2 running
//! PDF Export (3 images)  3/3 done → MyTab_2026-03-14.pdf
//! PDF Export (3 images)  1/3 failed: disk full
//! ```
//!
//! ## Events
//!
//! ```text
//! [job 1] started: ZIP Export (2 images)
//! [job 1] 1/2
//! [job 1] skipped 003: no crop
//! [job 1] done → cropped_images_2026-03-14.zip
//! ```
//!
//! ## History
//!
//! ```text
//! 2026-03-14 12:00  ZIP Export - 2 images
//!     Output: cropped_images_2026-03-14.zip
//!     001 a.png
//!     002 b.png
//! ```
//!
//! # Architecture
//!
//! Format functions are pure: they return `String` or `Vec<String>` and
//! never print. Positional indices are 1-based and zero-padded to three
//! digits, so index `0` displays as `001`.

use crate::export::{ExportJob, JobEvent, JobStatus};
use crate::history::HistoryEntry;
use crate::types::ImageIndex;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 0-based image index as a 1-based, 3-digit position.
fn format_position(index: ImageIndex) -> String {
    format!("{:0>3}", index + 1)
}

/// `→ artifact` for done, `: message` for failed, nothing otherwise.
fn result_suffix(status: JobStatus, result: Option<&str>) -> String {
    match (status, result) {
        (JobStatus::Done, Some(artifact)) => format!(" → {}", artifact),
        (JobStatus::Failed, Some(message)) => format!(": {}", message),
        _ => String::new(),
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// One line per job for a progress list.
pub fn format_job_line(job: &ExportJob) -> String {
    format!(
        "{}  {}/{} {}{}",
        job.label,
        job.completed,
        job.total,
        job.status.label(),
        result_suffix(job.status, job.result.as_deref())
    )
}

pub fn format_job_list(jobs: &[ExportJob]) -> Vec<String> {
    if jobs.is_empty() {
        return vec!["No active exports".to_string()];
    }
    jobs.iter().map(format_job_line).collect()
}

/// Format a single progress event.
pub fn format_job_event(event: &JobEvent) -> String {
    match event {
        JobEvent::Started { job, label } => format!("[job {}] started: {}", job, label),
        JobEvent::Progress {
            job,
            completed,
            total,
        } => format!("[job {}] {}/{}", job, completed, total),
        JobEvent::ItemSkipped { job, index, reason } => {
            format!("[job {}] skipped {}: {}", job, format_position(*index), reason)
        }
        JobEvent::Finished {
            job,
            status,
            result,
        } => format!(
            "[job {}] {}{}",
            job,
            status.label(),
            result_suffix(*status, result.as_deref())
        ),
    }
}

// ============================================================================
// History
// ============================================================================

/// Header line plus indented output and item lines.
pub fn format_history_entry(entry: &HistoryEntry) -> Vec<String> {
    let mut lines = vec![format!(
        "{}  {}",
        entry.created_at.format("%Y-%m-%d %H:%M"),
        entry.label
    )];
    lines.push(format!("    Output: {}", entry.output_manifest.artifact));
    for (pos, record) in entry.crop_snapshot.iter().enumerate() {
        lines.push(format!("    {} {}", format_position(pos), record.name));
    }
    lines
}

/// Summary line for a compact history list.
pub fn format_history_line(entry: &HistoryEntry) -> String {
    format!(
        "{}  {} ({})",
        entry.created_at.format("%Y-%m-%d %H:%M"),
        entry.label,
        entry.output_manifest.artifact
    )
}
