//! Output and archive naming.
//!
//! Every item output is named `<stem>_processed.<ext>`, where the stem is the
//! sanitized source name without its extension:
//! - `passport.png` → `passport_processed.jpg`
//! - `scans/id card.pdf` → `id_card_processed.jpg`
//! - two items both called `photo.jpg` at positions 3 and 7 →
//!   `photo_3_processed.jpg` and `photo_7_processed.jpg`
//! - a name already handed out gets a counter: `photo_1.png` after the second
//!   of two `photo.png` items → `photo_1_2_processed.jpg`
//!
//! Names are assigned for the whole batch at once, in encounter order, so they
//! never depend on which worker finishes first.

use crate::types::OutputFormat;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Stem used when a name sanitizes to nothing.
const FALLBACK_STEM: &str = "image";
const DEFAULT_ARCHIVE: &str = "processed_files.zip";

/// Keep ASCII letters, digits, `.`, `_`, and `-`; everything else becomes `_`.
/// Leading dots are stripped so the result is never hidden or `..`.
pub fn sanitize_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_start_matches('.').to_string()
}

/// Sanitized base name of `name` without its extension.
pub fn file_stem(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_filename)
        .unwrap_or_default();
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    }
}

/// Output filename for one item.
pub fn output_filename(source_name: &str, format: OutputFormat) -> String {
    format!("{}_processed.{}", file_stem(source_name), format.extension())
}

/// Output filenames for a whole batch, in encounter order.
///
/// Items whose stems collide get their index inserted; unique stems keep the
/// plain form. A name that is still taken (an indexed name can match another
/// item's plain stem) gets `_2`, `_3`, ... until it is free, so every returned
/// name is distinct.
pub fn output_filenames<S: AsRef<str>>(source_names: &[S], format: OutputFormat) -> Vec<String> {
    let ext = format.extension();
    let stems: Vec<String> = source_names.iter().map(|n| file_stem(n.as_ref())).collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for stem in &stems {
        *counts.entry(stem.as_str()).or_default() += 1;
    }

    let mut taken: HashSet<String> = HashSet::with_capacity(stems.len());
    stems
        .iter()
        .enumerate()
        .map(|(index, stem)| {
            let base = if counts[stem.as_str()] > 1 {
                format!("{stem}_{index}")
            } else {
                stem.clone()
            };
            let mut name = format!("{base}_processed.{ext}");
            let mut suffix = 2;
            while taken.contains(&name) {
                name = format!("{base}_{suffix}_processed.{ext}");
                suffix += 1;
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// Download name for the multi-item archive.
///
/// A requested name is sanitized and given a `.zip` suffix; otherwise a single
/// submitted artifact names the archive, and several give `processed_files.zip`.
pub fn archive_filename<S: AsRef<str>>(requested: Option<&str>, artifact_names: &[S]) -> String {
    if let Some(requested) = requested {
        let clean = sanitize_filename(requested.trim());
        if !clean.is_empty() {
            return if clean.to_ascii_lowercase().ends_with(".zip") {
                clean
            } else {
                format!("{clean}.zip")
            };
        }
    }
    match artifact_names {
        [single] => format!("processed_{}.zip", file_stem(single.as_ref())),
        _ => DEFAULT_ARCHIVE.to_string(),
    }
}
