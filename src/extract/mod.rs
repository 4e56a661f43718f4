//! Page and entry extraction: turn submitted artifacts into per-item work.
//!
//! Extraction happens in two phases so that every limit is checked before any
//! pixel data is decoded:
//!
//! 1. **Planning** ([`expand_artifacts`], sequential). Artifact sizes are
//!    checked, bytes are sniffed, and ZIP central directories are read. The
//!    result is an ordered list of [`Planned`] entries: one per future item,
//!    plus skipped ZIP entries that only produce a log line.
//! 2. **Decoding** ([`decode_item`], inside each item's pipeline). The single
//!    image, page 1 of a PDF, or one inflated ZIP entry becomes a
//!    [`RasterFrame`].
//!
//! | Source | Frame |
//! |---|---|
//! | JPEG / PNG | decoded directly, with decoder dimension limits |
//! | PDF | page 1 only, see [`pdf`] |
//! | ZIP entry | inflated up to its declared size, see [`archive`] |

pub mod archive;
pub mod pdf;

use crate::config::PipelineConfig;
use crate::error::ItemError;
use crate::sniff::sniff;
use crate::types::{ArtifactInput, InputArtifact, MediaKind, Provenance, RasterFrame, Rotation};
use archive::EntryDecision;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use tracing::{debug, warn};

/// What an item's pipeline has to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    Image,
    Pdf,
    ZipEntry { entry_index: usize, declared_size: u64 },
    /// Failed during planning; the pipeline records the error and stops.
    Rejected(ItemError),
}

/// One future [`crate::types::ProcessedItem`].
#[derive(Debug, Clone)]
pub struct PlannedItem {
    /// Index into [`Expansion::artifacts`].
    pub artifact: usize,
    /// Display name: artifact name, or entry base name for ZIP entries.
    pub source_name: String,
    pub source: ItemSource,
}

#[derive(Debug, Clone)]
pub enum Planned {
    Item(PlannedItem),
    /// ZIP entry skipped without inflation. Logged, not counted as an item.
    Skipped { entry: String, reason: String },
}

/// Artifacts (owned) plus the ordered work derived from them.
#[derive(Debug)]
pub struct Expansion {
    pub artifacts: Vec<InputArtifact>,
    pub planned: Vec<Planned>,
}

impl Expansion {
    pub fn items(&self) -> impl Iterator<Item = &PlannedItem> {
        self.planned.iter().filter_map(|p| match p {
            Planned::Item(item) => Some(item),
            Planned::Skipped { .. } => None,
        })
    }
}

/// Sniff, size-check, and enumerate every artifact in encounter order.
///
/// Never fails: problems with one artifact become a [`ItemSource::Rejected`]
/// item for that artifact.
pub fn expand_artifacts(inputs: Vec<ArtifactInput>, config: &PipelineConfig) -> Expansion {
    let limits = &config.limits;
    let mut artifacts = Vec::with_capacity(inputs.len());
    let mut planned = Vec::new();

    for (artifact, input) in inputs.into_iter().enumerate() {
        let declared = input.bytes.len() as u64;
        if declared > limits.max_file_bytes {
            warn!(name = %input.filename, size = declared, "artifact over size limit");
            planned.push(Planned::Item(PlannedItem {
                artifact,
                source_name: input.filename.clone(),
                source: ItemSource::Rejected(ItemError::SizeLimitExceeded(format!(
                    "{declared} bytes exceeds the {} byte limit",
                    limits.max_file_bytes
                ))),
            }));
            // The bytes are never looked at again.
            artifacts.push(InputArtifact {
                id: crate::types::artifact_id(&[]),
                name: input.filename,
                bytes: Vec::new(),
                kind: MediaKind::Unknown,
            });
            continue;
        }

        let art = InputArtifact::new(input.filename, input.bytes);
        debug!(name = %art.name, id = %art.id, kind = %art.kind, "sniffed artifact");
        let item = |source| {
            Planned::Item(PlannedItem {
                artifact,
                source_name: art.name.clone(),
                source,
            })
        };

        match art.kind {
            MediaKind::Image => planned.push(item(ItemSource::Image)),
            MediaKind::Pdf => planned.push(item(ItemSource::Pdf)),
            MediaKind::Unknown => planned.push(item(ItemSource::Rejected(
                ItemError::UnsupportedFormat(
                    "not a JPEG, PNG, PDF, or ZIP file".to_string(),
                ),
            ))),
            MediaKind::Zip => match archive::plan_entries(&art.bytes, limits) {
                Ok(entries) => {
                    planned.extend(entries.into_iter().map(|decision| match decision {
                        EntryDecision::Process(entry) => Planned::Item(PlannedItem {
                            artifact,
                            source_name: entry.name,
                            source: ItemSource::ZipEntry {
                                entry_index: entry.index,
                                declared_size: entry.declared_size,
                            },
                        }),
                        EntryDecision::Reject { name, error } => Planned::Item(PlannedItem {
                            artifact,
                            source_name: name,
                            source: ItemSource::Rejected(error),
                        }),
                        EntryDecision::Skip { name, reason } => Planned::Skipped {
                            entry: name,
                            reason,
                        },
                    }));
                }
                Err(err) => {
                    warn!(name = %art.name, error = %err, "archive rejected");
                    planned.push(item(ItemSource::Rejected(err)));
                }
            },
        }
        artifacts.push(art);
    }

    Expansion { artifacts, planned }
}

/// Decode the frame an item's pipeline works on.
pub fn decode_item(
    artifact: &InputArtifact,
    source: &ItemSource,
    config: &PipelineConfig,
) -> Result<RasterFrame, ItemError> {
    let max_dimension = config.limits.max_image_dimension;
    let provenance = |index| Provenance {
        artifact_id: artifact.id.clone(),
        index,
        rotation: Rotation::R0,
    };

    match source {
        ItemSource::Rejected(err) => Err(err.clone()),
        ItemSource::Image => {
            let image = decode_image(&artifact.bytes, max_dimension)?;
            Ok(RasterFrame::new(image, provenance(None)))
        }
        ItemSource::Pdf => {
            let image = pdf::rasterize_first_page(&artifact.bytes, config)?;
            Ok(RasterFrame::new(image, provenance(Some(0))))
        }
        ItemSource::ZipEntry {
            entry_index,
            declared_size,
        } => {
            let bytes = archive::inflate_entry(&artifact.bytes, *entry_index, *declared_size)?;
            if sniff(&bytes) != MediaKind::Image {
                return Err(ItemError::UnsupportedFormat(
                    "entry content is not a JPEG or PNG image".to_string(),
                ));
            }
            let image = decode_image(&bytes, max_dimension)?;
            Ok(RasterFrame::new(image, provenance(Some(*entry_index))))
        }
    }
}

/// Decode JPEG or PNG bytes, refusing images larger than `max_dimension` on
/// either side before any pixel buffer is allocated.
pub fn decode_image(bytes: &[u8], max_dimension: u32) -> Result<DynamicImage, ItemError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ItemError::CorruptArtifact(e.to_string()))?;
    if reader.format().is_none() {
        return Err(ItemError::UnsupportedFormat(
            "unrecognized image encoding".to_string(),
        ));
    }
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    reader.limits(limits);
    Ok(reader.decode()?)
}
