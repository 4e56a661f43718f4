//! ZIP bundles: central-directory planning and bounded inflation.
//!
//! Every limit is checked against the sizes the central directory declares
//! before a single byte is inflated. Inflation then re-validates against the
//! bytes actually produced, so a forged size field cannot smuggle more data
//! than was declared.

use crate::config::LimitsConfig;
use crate::error::ItemError;
use crate::types::MediaKind;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, instrument, warn};
use zip::ZipArchive;

/// An entry that will become an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPlan {
    /// Position in the central directory.
    pub index: usize,
    /// Base name of the entry, path components stripped.
    pub name: String,
    pub declared_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    Process(EntryPlan),
    /// Becomes an Error item without being inflated.
    Reject { name: String, error: ItemError },
    /// Logged and dropped; not an item.
    Skip { name: String, reason: String },
}

/// Walk the central directory and decide what happens to every entry.
///
/// Archive-wide limits (entry count, summed declared size) reject the whole
/// archive; the per-entry size limit rejects only that entry.
#[instrument(skip_all, fields(archive_bytes = bytes.len()))]
pub fn plan_entries(
    bytes: &[u8],
    limits: &LimitsConfig,
) -> Result<Vec<EntryDecision>, ItemError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut candidates = Vec::new();
    for index in 0..archive.len() {
        // Raw access reads only the central directory record; nothing is inflated.
        let entry = archive.by_index_raw(index)?;
        if entry.is_dir() || is_resource_fork(entry.name()) {
            continue;
        }
        candidates.push((index, entry.name().to_string(), entry.size()));
    }

    if candidates.len() > limits.max_files {
        return Err(ItemError::SizeLimitExceeded(format!(
            "archive holds {} files; the limit is {}",
            candidates.len(),
            limits.max_files
        )));
    }

    let declared_total = candidates
        .iter()
        .fold(0u64, |acc, (_, _, size)| acc.saturating_add(*size));
    if declared_total > limits.max_archive_uncompressed_bytes {
        return Err(ItemError::SizeLimitExceeded(format!(
            "archive declares {declared_total} uncompressed bytes; the ceiling is {}",
            limits.max_archive_uncompressed_bytes
        )));
    }

    let decisions = candidates
        .into_iter()
        .map(|(index, raw_name, declared_size)| {
            let name = entry_base_name(&raw_name, index);
            if !MediaKind::is_supported_extension(&name) {
                EntryDecision::Skip {
                    name,
                    reason: "not a supported image type".to_string(),
                }
            } else if declared_size == 0 {
                EntryDecision::Skip {
                    name,
                    reason: "empty entry".to_string(),
                }
            } else if declared_size > limits.max_file_bytes {
                warn!(entry = %name, declared_size, "entry over size limit");
                EntryDecision::Reject {
                    error: ItemError::SizeLimitExceeded(format!(
                        "entry declares {declared_size} bytes; the limit is {}",
                        limits.max_file_bytes
                    )),
                    name,
                }
            } else {
                EntryDecision::Process(EntryPlan {
                    index,
                    name,
                    declared_size,
                })
            }
        })
        .collect::<Vec<_>>();

    debug!(entries = decisions.len(), declared_total, "planned archive entries");
    Ok(decisions)
}

/// Inflate one entry, producing at most `declared_size` bytes.
///
/// Reading stops one byte past the declared size: if that byte exists the
/// size field was forged and the entry fails with `SizeLimitExceeded`
/// rather than being silently truncated.
pub fn inflate_entry(
    bytes: &[u8],
    index: usize,
    declared_size: u64,
) -> Result<Vec<u8>, ItemError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let entry = archive.by_index(index)?;

    let mut out = Vec::with_capacity(declared_size.min(1 << 20) as usize);
    entry
        .take(declared_size.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| ItemError::CorruptArtifact(format!("zip entry: {e}")))?;

    if out.len() as u64 > declared_size {
        warn!(index, declared_size, "entry inflates past its declared size");
        return Err(ItemError::SizeLimitExceeded(format!(
            "entry inflates past its declared {declared_size} bytes"
        )));
    }
    Ok(out)
}

/// `__MACOSX/` folders and AppleDouble `._name` files.
fn is_resource_fork(name: &str) -> bool {
    name.starts_with("__MACOSX/")
        || Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("._"))
}

/// Base name of an entry path; `..`-style names fall back to a positional name.
fn entry_base_name(name: &str, index: usize) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("entry_{index}"))
}
