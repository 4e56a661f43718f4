//! Shared types flowing through the per-item pipeline.
//!
//! Ownership follows the data flow: an [`InputArtifact`] is created at request
//! ingress and dropped when the batch completes; a [`RasterFrame`] is moved from
//! stage to stage and never shared; a [`FaceBox`] is consumed by the crop
//! planner only. The request/response types at the bottom of this module are
//! the external contract of the crate.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{Duration, Instant};

// ============================================================================
// Artifacts
// ============================================================================

/// Media kind as classified by [`crate::sniff::sniff`] from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Pdf,
    Zip,
    Unknown,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Zip => "zip",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One submitted file, immutable once sniffed.
#[derive(Debug)]
pub struct InputArtifact {
    /// Stable id: first 12 hex chars of the SHA-256 of `bytes`.
    pub id: String,
    pub name: String,
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
}

impl InputArtifact {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let id = artifact_id(&bytes);
        let kind = crate::sniff::sniff(&bytes);
        Self {
            id,
            name: name.into(),
            bytes,
            kind,
        }
    }
}

/// Short content hash used to tag provenance and tracing spans.
pub fn artifact_id(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..12].to_string()
}

/// Full SHA-256 hex digest of an encoded output.
pub fn output_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ============================================================================
// Frames
// ============================================================================

/// Clockwise quarter-turn applied to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    /// Evaluation order, which doubles as the tie-break order: unrotated first,
    /// then the quarter turns (clockwise before counter-clockwise), then 180°.
    pub const CANDIDATES: [Rotation; 4] = [Self::R0, Self::R90, Self::R270, Self::R180];

    pub fn degrees(self) -> u32 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }

    /// Rotate `image` clockwise by this amount.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::R0 => image,
            Self::R90 => image.rotate90(),
            Self::R180 => image.rotate180(),
            Self::R270 => image.rotate270(),
        }
    }

    /// Compose two clockwise rotations.
    pub fn then(self, next: Rotation) -> Rotation {
        match (self.degrees() + next.degrees()) % 360 {
            90 => Self::R90,
            180 => Self::R180,
            270 => Self::R270,
            _ => Self::R0,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Where a frame came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub artifact_id: String,
    /// Page index (PDF) or entry index (ZIP); `None` for plain images.
    pub index: Option<usize>,
    /// Rotation applied so far.
    pub rotation: Rotation,
}

/// Decoded pixels plus provenance. Moved between stages, never shared.
#[derive(Debug, Clone)]
pub struct RasterFrame {
    pub image: DynamicImage,
    pub provenance: Provenance,
}

impl RasterFrame {
    pub fn new(image: DynamicImage, provenance: Provenance) -> Self {
        Self { image, provenance }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Consume the frame and return it rotated clockwise by `rotation`.
    pub fn rotated(self, rotation: Rotation) -> Self {
        let Self { image, provenance } = self;
        Self {
            image: rotation.apply(image),
            provenance: Provenance {
                rotation: provenance.rotation.then(rotation),
                ..provenance
            },
        }
    }
}

// ============================================================================
// Detection and cropping
// ============================================================================

/// Face rectangle in a frame's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Always within [0, 1].
    pub confidence: f64,
}

impl FaceBox {
    /// Build a box, clamping `confidence` into [0, 1] (NaN becomes 0).
    pub fn new(x: f64, y: f64, width: f64, height: f64, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
            confidence,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Scale coordinates by `factor` (confidence unchanged).
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
        }
    }
}

/// Integer pixel rectangle within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fixed output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

impl Default for OutputSize {
    fn default() -> Self {
        Self {
            width: 360,
            height: 480,
        }
    }
}

/// Crop rectangle in source-frame coordinates plus target dimensions.
///
/// Invariants: `rect` lies fully inside the frame, and
/// `rect.width * output.height == rect.height * output.width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropPlan {
    pub rect: CropRect,
    pub output: OutputSize,
    /// The ideal rectangle did not fit and was shrunk.
    pub approximated: bool,
}

// ============================================================================
// Item state and results
// ============================================================================

/// Per-item state machine position. Terminal states live in [`ItemStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemStage {
    Pending,
    Extracted,
    Oriented,
    FaceResolved,
    Cropped,
    Encoded,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Extracted => "extracted",
            Self::Oriented => "oriented",
            Self::FaceResolved => "face_resolved",
            Self::Cropped => "cropped",
            Self::Encoded => "encoded",
        };
        f.write_str(name)
    }
}

/// Per-item time budget, checked cooperatively between stages.
///
/// Nothing is interrupted: a decode or `locate` call that runs long is only
/// reported as `Timeout` once it returns and the next check runs, with the
/// full elapsed time.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `Timeout` naming `stage` (the last stage reached) once the budget is spent.
    pub fn check(&self, stage: ItemStage) -> Result<(), crate::error::ItemError> {
        let elapsed = self.elapsed();
        if elapsed > self.budget {
            return Err(crate::error::ItemError::Timeout {
                stage,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Success,
    Warning,
    Error,
}

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Encoded output of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// Terminal record for one item.
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    /// Encounter-order position in the batch.
    pub index: usize,
    /// Display name of the input (artifact name, or entry base name for ZIPs).
    pub source_name: String,
    /// Stable output filename, derived from the input name and index.
    pub filename: String,
    pub status: ItemStatus,
    pub log: String,
    pub output: Option<EncodedImage>,
    pub warnings: Vec<crate::error::ItemWarning>,
    pub error: Option<crate::error::ItemError>,
    /// Rotation applied to the source (only meaningful for non-error items).
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub total: usize,
    pub succeeded: usize,
    pub warnings: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Either the single encoded image or a ZIP of all successful outputs.
#[derive(Debug, Clone)]
pub enum BatchOutput {
    Image {
        filename: String,
        image: EncodedImage,
    },
    Archive {
        filename: String,
        bytes: Vec<u8>,
    },
}

impl BatchOutput {
    pub fn filename(&self) -> &str {
        match self {
            Self::Image { filename, .. } | Self::Archive { filename, .. } => filename,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Image { image, .. } => &image.bytes,
            Self::Archive { bytes, .. } => bytes,
        }
    }
}

/// Items in encounter order, aggregate counts, and the assembled output.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub items: Vec<ProcessedItem>,
    pub logs: Vec<String>,
    pub counts: BatchCounts,
    pub output: BatchOutput,
}

// ============================================================================
// External contract
// ============================================================================

/// One input file of a processing request.
#[derive(Debug, Clone)]
pub struct ArtifactInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ArtifactInput {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Per-request overrides of the loaded configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcessingOptions {
    pub margin_ratio: Option<f64>,
    pub output_width: Option<u32>,
    pub output_height: Option<u32>,
    /// Download name for the multi-item archive.
    pub archive_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessingRequest {
    pub artifacts: Vec<ArtifactInput>,
    pub options: ProcessingOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Partial,
    Error,
}

/// Where an item's output can be found in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutputRef {
    #[serde(rename_all = "camelCase")]
    Inline {
        media_type: String,
        data_base64: String,
    },
    #[serde(rename_all = "camelCase")]
    ArchiveEntry { archive: String, entry: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    pub filename: String,
    pub source: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<OutputRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResponse {
    pub status: ResponseStatus,
    pub logs: Vec<String>,
    pub items: Vec<ResponseItem>,
    pub counts: BatchCounts,
}
