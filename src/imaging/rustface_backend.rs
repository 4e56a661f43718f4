use super::detector::{FaceLocator, LocatorError};
use crate::types::{FaceBox, RasterFrame};
use std::io::Cursor;
use std::path::Path;

/// Raw SeetaFace scores are unbounded; `s / (s + SCORE_SCALE)` maps them into
/// [0, 1) with the detector's own threshold (2.0) landing at 0.5.
const SCORE_SCALE: f64 = 2.0;

/// Face locator backed by the `rustface` crate (SeetaFace engine).
///
/// The model is read once; a fresh detector is created per call because
/// `rustface` detectors are stateful and not `Sync`.
pub struct RustfaceLocator {
    model: rustface::Model,
}

impl RustfaceLocator {
    /// Load a SeetaFace model file (e.g. `seeta_fd_frontal_v1.0.bin`).
    pub fn from_file(path: &Path) -> Result<Self, LocatorError> {
        let bytes = std::fs::read(path)?;
        let model = rustface::read_model(Cursor::new(bytes))
            .map_err(|e| LocatorError::Model(e.to_string()))?;
        Ok(Self { model })
    }
}

impl FaceLocator for RustfaceLocator {
    fn locate(&self, frame: &RasterFrame) -> Vec<FaceBox> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let gray = frame.image.to_luma8();
        let (width, height) = gray.dimensions();
        let mut image = rustface::ImageData::new(gray.as_raw(), width, height);

        detector
            .detect(&mut image)
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let score = face.score().max(0.0);
                FaceBox::new(
                    f64::from(bbox.x()),
                    f64::from(bbox.y()),
                    f64::from(bbox.width()),
                    f64::from(bbox.height()),
                    score / (score + SCORE_SCALE),
                )
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "rustface"
    }
}
