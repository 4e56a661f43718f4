//! Batch orchestration.
//!
//! Takes a [`ProcessingRequest`], runs every item through its own pipeline,
//! and assembles a [`BatchResult`]: the single encoded image, or a ZIP of all
//! successful outputs when the batch has more than one item.
//!
//! ## Item State Machine
//!
//! ```text
//! Pending → Extracted → Oriented → FaceResolved → Cropped → Encoded
//!    │          │           │            │            │         │
//!    └──────────┴───────────┴────────────┴────────────┴─────────┴──→ Error
//!                                                      Encoded ──→ Success | Warning
//! ```
//!
//! Every transition checks the item's deadline. An item that fails at any
//! stage is recorded with an `Error` status and a log line; the rest of the
//! batch carries on.
//!
//! ## Parallel Processing
//!
//! Planning (sniffing, size checks, ZIP central directories) is sequential.
//! Item pipelines then run on a dedicated [rayon](https://docs.rs/rayon) pool
//! sized by [`effective_threads`]; results are collected in encounter order,
//! so logs and outputs never depend on scheduling.
//!
//! ## Cancellation
//!
//! A [`CancelFlag`] is checked before each item starts. Items already running
//! finish; the batch then returns [`BatchError::Cancelled`] and every output
//! is dropped.

use crate::config::{PipelineConfig, effective_threads};
use crate::error::{BatchError, ItemError, ItemWarning};
use crate::extract::{Planned, PlannedItem, decode_item, expand_artifacts};
use crate::imaging::{
    CropAnchor, FaceLocator, StageParams, detect_orientation, encode_frame, plan_crop, render_crop,
};
use crate::naming::{archive_filename, output_filenames};
use crate::types::{
    BatchCounts, BatchOutput, BatchResult, Deadline, EncodedImage, InputArtifact, ItemStage,
    ItemStatus, OutputRef, ProcessedItem, ProcessingRequest, ProcessingResponse, ResponseItem,
    ResponseStatus, Rotation, output_digest,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rayon::prelude::*;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use tracing::{debug, info, instrument, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Batch-scoped cancellation, shared between the caller and the workers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress events sent while a batch runs.
#[derive(Debug, Clone)]
pub enum ItemEvent {
    BatchStarted {
        artifacts: usize,
        items: usize,
    },
    /// Sent as each item reaches a terminal state, in completion order.
    ItemFinished {
        /// Items finished so far, this one included.
        done: usize,
        total: usize,
        index: usize,
        filename: String,
        status: ItemStatus,
        log: String,
    },
}

/// Process a batch without progress events or cancellation.
pub fn process_batch(
    request: ProcessingRequest,
    config: &PipelineConfig,
    locator: &dyn FaceLocator,
) -> Result<BatchResult, BatchError> {
    process_batch_with_events(request, config, locator, &CancelFlag::new(), None)
}

/// Process a batch, streaming [`ItemEvent`]s to `events` if given.
#[instrument(skip_all, fields(artifacts = request.artifacts.len(), locator = locator.name()))]
pub fn process_batch_with_events(
    request: ProcessingRequest,
    config: &PipelineConfig,
    locator: &dyn FaceLocator,
    cancel: &CancelFlag,
    events: Option<&Sender<ItemEvent>>,
) -> Result<BatchResult, BatchError> {
    let ProcessingRequest { artifacts, options } = request;
    if artifacts.is_empty() {
        return Err(BatchError::EmptyBatch);
    }
    if artifacts.len() > config.limits.max_files {
        return Err(BatchError::TooManyFiles {
            count: artifacts.len(),
            limit: config.limits.max_files,
        });
    }
    let config = config
        .with_options(&options)
        .map_err(|e| BatchError::InvalidOptions(e.to_string()))?;
    let params = StageParams::from(&config);

    let artifact_names: Vec<&str> = artifacts.iter().map(|a| a.filename.as_str()).collect();
    let archive_name = archive_filename(options.archive_name.as_deref(), &artifact_names);
    let artifact_count = artifacts.len();

    let expansion = expand_artifacts(artifacts, &config);
    let planned: Vec<&PlannedItem> = expansion.items().collect();
    let filenames = output_filenames(
        &planned
            .iter()
            .map(|p| p.source_name.as_str())
            .collect::<Vec<_>>(),
        params.encode.format,
    );
    let total = planned.len();
    info!(artifacts = artifact_count, items = total, "batch planned");
    send(
        events,
        ItemEvent::BatchStarted {
            artifacts: artifact_count,
            items: total,
        },
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(effective_threads(&config.processing))
        .build()
        .map_err(|e| BatchError::ThreadPool(e.to_string()))?;

    let done = AtomicUsize::new(0);
    let results: Vec<Option<ProcessedItem>> = pool.install(|| {
        planned
            .par_iter()
            .zip(filenames.par_iter())
            .enumerate()
            .map(|(index, (item, filename))| {
                if cancel.is_cancelled() {
                    return None;
                }
                let artifact = &expansion.artifacts[item.artifact];
                let processed =
                    run_item(index, item, artifact, filename, &config, &params, locator);
                send(
                    events,
                    ItemEvent::ItemFinished {
                        done: done.fetch_add(1, Ordering::SeqCst) + 1,
                        total,
                        index,
                        filename: processed.filename.clone(),
                        status: processed.status,
                        log: processed.log.clone(),
                    },
                );
                Some(processed)
            })
            .collect()
    });

    if cancel.is_cancelled() {
        let completed = results.iter().flatten().count();
        warn!(completed, total, "batch cancelled");
        return Err(BatchError::Cancelled { completed });
    }
    let items: Vec<ProcessedItem> = results.into_iter().flatten().collect();

    // Logs in encounter order, skipped entries interleaved where they were found.
    let mut logs = vec![format!("Processing {artifact_count} artifact(s)...")];
    let mut item_logs = items.iter().map(|item| item.log.clone());
    for entry in &expansion.planned {
        match entry {
            Planned::Item(_) => logs.extend(item_logs.next()),
            Planned::Skipped { entry, reason } => {
                logs.push(format!("SKIPPED: '{entry}': {reason}"));
            }
        }
    }

    let counts = count_items(&items, &expansion.planned);
    let produced = counts.succeeded + counts.warnings;
    if produced == 0 {
        logs.push("No images were successfully processed.".to_string());
        return Err(BatchError::AllItemsFailed { logs, items });
    }
    logs.push(format!("DONE: processed {produced} of {} item(s)", counts.total));

    let output = assemble_output(&items, archive_name)?;
    info!(
        succeeded = counts.succeeded,
        warnings = counts.warnings,
        failed = counts.failed,
        skipped = counts.skipped,
        "batch complete"
    );
    Ok(BatchResult {
        items,
        logs,
        counts,
        output,
    })
}

fn send(events: Option<&Sender<ItemEvent>>, event: ItemEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching progress.
        tx.send(event).ok();
    }
}

// ============================================================================
// Per-item pipeline
// ============================================================================

/// What a completed pipeline hands back to the orchestrator.
struct Rendered {
    image: EncodedImage,
    rotation: Rotation,
    warnings: Vec<ItemWarning>,
}

#[instrument(skip_all, fields(index = index, source = %item.source_name))]
fn run_item(
    index: usize,
    item: &PlannedItem,
    artifact: &InputArtifact,
    filename: &str,
    config: &PipelineConfig,
    params: &StageParams,
    locator: &dyn FaceLocator,
) -> ProcessedItem {
    let deadline = Deadline::start(config.processing.item_timeout());
    let mut stage = ItemStage::Pending;
    let name = &item.source_name;

    let (status, log, output, warnings, error, rotation) =
        match run_stages(item, artifact, config, params, locator, &deadline, &mut stage) {
            Ok(Rendered {
                image,
                rotation,
                warnings,
            }) => {
                let (status, log) = if warnings.is_empty() {
                    (ItemStatus::Success, format!("SUCCESS: '{name}'"))
                } else {
                    let text: Vec<String> = warnings.iter().map(ToString::to_string).collect();
                    (
                        ItemStatus::Warning,
                        format!("WARNING: '{name}': {}", text.join("; ")),
                    )
                };
                (status, log, Some(image), warnings, None, rotation)
            }
            Err(err) => {
                warn!(stage = %stage, kind = err.kind(), error = %err, "item failed");
                let log = format!("FAILED: '{name}' at {stage}: {err}");
                (ItemStatus::Error, log, None, Vec::new(), Some(err), Rotation::R0)
            }
        };
    debug!(status = ?status, elapsed_ms = deadline.elapsed().as_millis() as u64, "item finished");

    ProcessedItem {
        index,
        source_name: name.clone(),
        filename: filename.to_string(),
        status,
        log,
        output,
        warnings,
        error,
        rotation,
    }
}

/// Drive one item from `Pending` to `Encoded`, recording the last stage
/// reached in `stage`.
fn run_stages(
    item: &PlannedItem,
    artifact: &InputArtifact,
    config: &PipelineConfig,
    params: &StageParams,
    locator: &dyn FaceLocator,
    deadline: &Deadline,
    stage: &mut ItemStage,
) -> Result<Rendered, ItemError> {
    let mut advance = |next: ItemStage| -> Result<(), ItemError> {
        *stage = next;
        deadline.check(next)
    };
    let mut warnings = Vec::new();

    deadline.check(ItemStage::Pending)?;
    let frame = decode_item(artifact, &item.source, config)?;
    advance(ItemStage::Extracted)?;

    let oriented = detect_orientation(frame, locator, &params.detection, deadline)?;
    advance(ItemStage::Oriented)?;

    let anchor = match oriented.face {
        Some(face) => CropAnchor::Face(face),
        None => {
            warnings.push(ItemWarning::NoFaceFallback);
            CropAnchor::Fallback
        }
    };
    advance(ItemStage::FaceResolved)?;

    let frame = oriented.frame;
    let plan = plan_crop((frame.width(), frame.height()), anchor, &params.crop)?;
    if plan.approximated {
        warnings.push(ItemWarning::EdgeClampApproximation);
    }
    let cropped = render_crop(&frame, &plan);
    drop(frame);
    advance(ItemStage::Cropped)?;

    let image = encode_frame(&cropped, &params.encode)?;
    advance(ItemStage::Encoded)?;

    Ok(Rendered {
        image,
        rotation: oriented.rotation,
        warnings,
    })
}

// ============================================================================
// Aggregation
// ============================================================================

fn count_items(items: &[ProcessedItem], planned: &[Planned]) -> BatchCounts {
    let mut counts = BatchCounts {
        total: items.len(),
        skipped: planned
            .iter()
            .filter(|p| matches!(p, Planned::Skipped { .. }))
            .count(),
        ..BatchCounts::default()
    };
    for item in items {
        match item.status {
            ItemStatus::Success => counts.succeeded += 1,
            ItemStatus::Warning => counts.warnings += 1,
            ItemStatus::Error => counts.failed += 1,
        }
    }
    counts
}

/// The single image for a one-item batch, otherwise a ZIP of every output.
fn assemble_output(items: &[ProcessedItem], archive_name: String) -> Result<BatchOutput, BatchError> {
    if let [single] = items {
        if let Some(image) = &single.output {
            return Ok(BatchOutput::Image {
                filename: single.filename.clone(),
                image: image.clone(),
            });
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    // Fixed timestamp so identical inputs give identical archives.
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    for item in items {
        let Some(image) = &item.output else {
            continue;
        };
        writer
            .start_file(item.filename.as_str(), options)
            .map_err(|e| BatchError::Archive(e.to_string()))?;
        writer
            .write_all(&image.bytes)
            .map_err(|e| BatchError::Archive(e.to_string()))?;
    }
    let bytes = writer
        .finish()
        .map_err(|e| BatchError::Archive(e.to_string()))?
        .into_inner();
    Ok(BatchOutput::Archive {
        filename: archive_name,
        bytes,
    })
}

// ============================================================================
// Response
// ============================================================================

/// Shape a batch outcome as the external response.
///
/// A successful single-item batch carries its image inline (base64); larger
/// batches point each item at its entry in the archive.
pub fn build_response(outcome: &Result<BatchResult, BatchError>) -> ProcessingResponse {
    match outcome {
        Ok(result) => {
            let status = if result.counts.failed == 0 {
                ResponseStatus::Success
            } else {
                ResponseStatus::Partial
            };
            let items = result
                .items
                .iter()
                .map(|item| {
                    let output_ref = item.output.as_ref().map(|image| match &result.output {
                        BatchOutput::Image { .. } => OutputRef::Inline {
                            media_type: image.format.media_type().to_string(),
                            data_base64: BASE64.encode(&image.bytes),
                        },
                        BatchOutput::Archive { filename, .. } => OutputRef::ArchiveEntry {
                            archive: filename.clone(),
                            entry: item.filename.clone(),
                        },
                    });
                    response_item(item, output_ref)
                })
                .collect();
            ProcessingResponse {
                status,
                logs: result.logs.clone(),
                items,
                counts: result.counts,
            }
        }
        Err(BatchError::AllItemsFailed { logs, items }) => ProcessingResponse {
            status: ResponseStatus::Error,
            logs: logs.clone(),
            items: items.iter().map(|item| response_item(item, None)).collect(),
            counts: BatchCounts {
                total: items.len(),
                failed: items.len(),
                ..BatchCounts::default()
            },
        },
        Err(other) => ProcessingResponse {
            status: ResponseStatus::Error,
            logs: vec![other.to_string()],
            items: Vec::new(),
            counts: BatchCounts::default(),
        },
    }
}

fn response_item(item: &ProcessedItem, output_ref: Option<OutputRef>) -> ResponseItem {
    ResponseItem {
        filename: item.filename.clone(),
        source: item.source_name.clone(),
        status: item.status,
        output_ref,
        digest: item.output.as_ref().map(|image| output_digest(&image.bytes)),
        error: item.error.as_ref().map(ToString::to_string),
    }
}
