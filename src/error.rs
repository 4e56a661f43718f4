//! Error taxonomy for item pipelines and whole batches.
//!
//! Two levels:
//!
//! - [`ItemError`]: why one item (an image, a PDF, or one ZIP entry) failed.
//!   The orchestrator records it against that item and moves on; it never
//!   crosses into another item's pipeline.
//! - [`BatchError`]: why the batch as a whole produced nothing to return.
//!
//! [`ItemWarning`] is not an error: the item still produces an output, but the
//! log line says what was approximated.

use crate::types::{ItemStage, ProcessedItem};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),
    #[error("size limit exceeded: {0}")]
    SizeLimitExceeded(String),
    #[error("timed out after {elapsed_ms}ms (last stage reached: {stage})")]
    Timeout { stage: ItemStage, elapsed_ms: u64 },
    #[error("encode failed: {0}")]
    InternalEncodeFailure(String),
}

impl ItemError {
    /// Short machine-friendly tag, used in tracing fields and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::CorruptArtifact(_) => "corrupt_artifact",
            Self::SizeLimitExceeded(_) => "size_limit_exceeded",
            Self::Timeout { .. } => "timeout",
            Self::InternalEncodeFailure(_) => "internal_encode_failure",
        }
    }
}

impl From<image::ImageError> for ItemError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => Self::UnsupportedFormat(e.to_string()),
            image::ImageError::Limits(e) => Self::SizeLimitExceeded(e.to_string()),
            other => Self::CorruptArtifact(other.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for ItemError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::UnsupportedArchive(msg) => {
                Self::UnsupportedFormat(format!("zip: {msg}"))
            }
            other => Self::CorruptArtifact(format!("zip: {other}")),
        }
    }
}

/// Non-fatal annotations attached to a successful item.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemWarning {
    #[error("no face detected, using default orientation")]
    NoFaceFallback,
    #[error("face region near edge; crop approximated")]
    EdgeClampApproximation,
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("no artifacts submitted")]
    EmptyBatch,
    #[error("{count} files submitted; the limit is {limit}")]
    TooManyFiles { count: usize, limit: usize },
    #[error("invalid processing options: {0}")]
    InvalidOptions(String),
    #[error("no images were successfully processed")]
    AllItemsFailed {
        logs: Vec<String>,
        items: Vec<ProcessedItem>,
    },
    #[error("batch cancelled after {completed} item(s)")]
    Cancelled { completed: usize },
    #[error("worker pool: {0}")]
    ThreadPool(String),
    #[error("output archive: {0}")]
    Archive(String),
}
