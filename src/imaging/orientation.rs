//! Orientation detection by face confidence.
//!
//! Each of the four quarter-turn rotations is probed with the face locator on
//! a downscaled copy of the frame. The rotation whose best face scores highest
//! wins; on a tie the earlier candidate in [`Rotation::CANDIDATES`] is kept,
//! which makes the choice repeatable for identical input.

use super::calculations::probe_scale;
use super::detector::{FaceLocator, best_face};
use super::params::DetectionParams;
use crate::error::ItemError;
use crate::types::{Deadline, FaceBox, ItemStage, RasterFrame, Rotation};
use image::imageops::FilterType;
use tracing::{debug, instrument};

/// Best face found under one rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationScore {
    pub rotation: Rotation,
    pub face: Option<FaceBox>,
}

impl RotationScore {
    pub fn confidence(&self) -> Option<f64> {
        self.face.map(|f| f.confidence)
    }
}

/// The upright frame plus its face, if one was found.
#[derive(Debug)]
pub struct Oriented {
    /// Rotated into the chosen orientation, at full resolution.
    pub frame: RasterFrame,
    pub rotation: Rotation,
    /// In `frame` coordinates.
    pub face: Option<FaceBox>,
    /// Probe results in candidate order.
    pub scores: Vec<RotationScore>,
}

/// Probe all four rotations and return the frame turned upright.
///
/// With no face under any rotation the frame stays at 0° and `face` is `None`.
#[instrument(skip_all, fields(
    artifact = %frame.provenance.artifact_id,
    width = frame.width(),
    height = frame.height(),
))]
pub fn detect_orientation(
    frame: RasterFrame,
    locator: &dyn FaceLocator,
    params: &DetectionParams,
    deadline: &Deadline,
) -> Result<Oriented, ItemError> {
    let scale = probe_scale(frame.width(), frame.height(), params.probe_dimension);
    let probe = if scale < 1.0 {
        let width = ((f64::from(frame.width()) * scale).round() as u32).max(1);
        let height = ((f64::from(frame.height()) * scale).round() as u32).max(1);
        RasterFrame::new(
            frame.image.resize_exact(width, height, FilterType::Triangle),
            frame.provenance.clone(),
        )
    } else {
        frame.clone()
    };

    let mut scores = Vec::with_capacity(Rotation::CANDIDATES.len());
    for rotation in Rotation::CANDIDATES {
        deadline.check(ItemStage::Extracted)?;
        let candidate = probe.clone().rotated(rotation);
        let face = best_face(locator.locate(&candidate), params.confidence_threshold);
        debug!(
            rotation = rotation.degrees(),
            confidence = face.map(|f| f.confidence),
            "probed rotation"
        );
        scores.push(RotationScore { rotation, face });
    }

    let chosen = select_rotation(&scores);
    let frame = frame.rotated(chosen.rotation);
    // Probe and full frame share an aspect ratio in every rotation.
    let face = chosen.face.map(|f| f.scaled(1.0 / scale));
    Ok(Oriented {
        frame,
        rotation: chosen.rotation,
        face,
        scores,
    })
}

/// First candidate with the strictly highest confidence, or 0° without faces.
pub fn select_rotation(scores: &[RotationScore]) -> RotationScore {
    let mut best: Option<&RotationScore> = None;
    for score in scores {
        let Some(confidence) = score.confidence() else {
            continue;
        };
        if best.and_then(RotationScore::confidence).is_none_or(|b| confidence > b) {
            best = Some(score);
        }
    }
    best.copied().unwrap_or(RotationScore {
        rotation: Rotation::R0,
        face: None,
    })
}
