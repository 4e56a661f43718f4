//! Face locator capability and face selection.
//!
//! The pipeline depends only on the [`FaceLocator`] contract: given a frame,
//! return zero or more [`FaceBox`]es in that frame's coordinates, always the
//! same boxes for the same pixels, without mutating the frame. Which
//! algorithm sits behind it is a deployment choice:
//!
//! | Locator | When |
//! |---|---|
//! | [`NullLocator`] | no detection model configured; every item takes the centered fallback |
//! | `RustfaceLocator` | `rustface` feature + `detection.model_path` |
//! | any custom impl | passed to [`crate::process::process_batch`] |

use crate::config::DetectionConfig;
use crate::types::{FaceBox, RasterFrame};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to load face model: {0}")]
    Model(String),
    #[error("detection.model_path is set but this build has no face detection backend")]
    BackendUnavailable,
}

/// Pluggable face detection.
///
/// Implementations must be deterministic for a given frame and must finish in
/// bounded time. Scores are normalized into [0, 1] by [`FaceBox::new`].
pub trait FaceLocator: Send + Sync {
    fn locate(&self, frame: &RasterFrame) -> Vec<FaceBox>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Finds nothing. Every item falls back to the centered crop.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLocator;

impl FaceLocator for NullLocator {
    fn locate(&self, _frame: &RasterFrame) -> Vec<FaceBox> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Build the locator the configuration asks for.
pub fn locator_from_config(
    config: &DetectionConfig,
) -> Result<Box<dyn FaceLocator>, LocatorError> {
    match &config.model_path {
        None => Ok(Box::new(NullLocator)),
        #[cfg(feature = "rustface")]
        Some(path) => {
            let locator = super::rustface_backend::RustfaceLocator::from_file(path)?;
            Ok(Box::new(locator))
        }
        #[cfg(not(feature = "rustface"))]
        Some(_) => Err(LocatorError::BackendUnavailable),
    }
}

/// Total order used to pick one face: higher confidence, then larger area,
/// then nearer the top, then nearer the left.
pub fn compare_faces(a: &FaceBox, b: &FaceBox) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then(a.area().total_cmp(&b.area()))
        .then(b.y.total_cmp(&a.y))
        .then(b.x.total_cmp(&a.x))
}

/// Best face at or above `threshold`, if any.
pub fn best_face(faces: impl IntoIterator<Item = FaceBox>, threshold: f64) -> Option<FaceBox> {
    faces
        .into_iter()
        .filter(|face| face.confidence >= threshold && face.area() > 0.0)
        .max_by(compare_faces)
}
