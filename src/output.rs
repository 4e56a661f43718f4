//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Process
//!
//! ```text
//! Processing 3 artifact(s), 4 item(s)
//! [1/4] passport_processed.jpg  SUCCESS: 'passport.jpg'
//! [2/4] scan_processed.jpg      WARNING: 'scan.pdf': no face detected, using default orientation
//! [3/4] broken_processed.jpg    FAILED: 'broken.png' at pending: corrupt artifact: ...
//! [4/4] b_processed.jpg         SUCCESS: 'b.jpg'
//!
//! 2 succeeded, 1 with warnings, 1 failed, 1 skipped
//! Wrote out/processed_files.zip
//! ```
//!
//! ## Sniff
//!
//! ```text
//! photo.jpg: image
//! bundle.jpg: zip
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::process::ItemEvent;
use crate::types::{BatchCounts, BatchResult, MediaKind};

/// Column width the filename is padded to in progress lines.
const FILENAME_COLUMN: usize = 24;

// ============================================================================
// Process
// ============================================================================

/// Format a single progress event as display lines.
pub fn format_item_event(event: &ItemEvent) -> Vec<String> {
    match event {
        ItemEvent::BatchStarted { artifacts, items } => {
            vec![format!(
                "Processing {artifacts} artifact(s), {items} item(s)"
            )]
        }
        ItemEvent::ItemFinished {
            done,
            total,
            filename,
            log,
            ..
        } => vec![format!(
            "[{done}/{total}] {filename:<width$} {log}",
            width = FILENAME_COLUMN
        )],
    }
}

/// One-line tally of a batch.
pub fn format_counts(counts: &BatchCounts) -> String {
    let mut parts = vec![
        format!("{} succeeded", counts.succeeded),
        format!("{} with warnings", counts.warnings),
        format!("{} failed", counts.failed),
    ];
    if counts.skipped > 0 {
        parts.push(format!("{} skipped", counts.skipped));
    }
    parts.join(", ")
}

/// Summary printed after a batch: counts, then the log lines of items that
/// did not simply succeed.
pub fn format_summary(result: &BatchResult) -> Vec<String> {
    let mut lines = vec![String::new(), format_counts(&result.counts)];
    let notable: Vec<&str> = result
        .logs
        .iter()
        .filter(|l| {
            l.starts_with("WARNING:") || l.starts_with("FAILED:") || l.starts_with("SKIPPED:")
        })
        .map(String::as_str)
        .collect();
    if !notable.is_empty() {
        lines.push(String::new());
        lines.extend(notable.iter().map(|l| format!("    {l}")));
    }
    lines
}

pub fn print_summary(result: &BatchResult) {
    for line in format_summary(result) {
        println!("{}", line);
    }
}

// ============================================================================
// Sniff
// ============================================================================

pub fn format_sniff(name: &str, kind: MediaKind) -> String {
    format!("{name}: {kind}")
}
