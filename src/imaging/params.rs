//! Parameter types for the imaging stages.
//!
//! These structs describe *what* to do, not *how* to do it. The orchestrator
//! builds them once per batch from the resolved [`PipelineConfig`] and hands
//! the same values to every item.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`DetectionParams`]: confidence threshold and probe size for orientation.
//! - [`CropParams`]: margin, fallback fraction, and target output size.
//! - [`EncodeParams`]: output format and quality.

use crate::config::PipelineConfig;
use crate::types::{OutputFormat, OutputSize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub confidence_threshold: f64,
    pub probe_dimension: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropParams {
    pub margin_ratio: f64,
    pub fallback_fraction: f64,
    pub output: OutputSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
}

/// All per-stage parameters for one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageParams {
    pub detection: DetectionParams,
    pub crop: CropParams,
    pub encode: EncodeParams,
}

impl From<&PipelineConfig> for StageParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            detection: DetectionParams {
                confidence_threshold: config.detection.confidence_threshold,
                probe_dimension: config.detection.probe_dimension,
            },
            crop: CropParams {
                margin_ratio: config.crop.margin_ratio,
                fallback_fraction: config.crop.fallback_fraction,
                output: config.output.size(),
            },
            encode: EncodeParams {
                format: config.output.format,
                quality: Quality::new(config.output.quality),
            },
        }
    }
}
