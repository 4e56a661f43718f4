//! Pipeline configuration module.
//!
//! Handles loading, validating, and merging `idframe.toml`. Stock defaults are
//! the base layer; a user file overrides any subset of keys on top of them,
//! and per-request [`ProcessingOptions`] override the result once more.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [output]
//! width = 360               # Output width in pixels
//! height = 480              # Output height in pixels
//! format = "jpeg"           # "jpeg" or "png"
//! quality = 90              # JPEG quality (1-100)
//!
//! [crop]
//! margin_ratio = 0.6        # Face-box expansion per side, relative to face size
//! fallback_fraction = 0.8   # Share of the largest centered 3:4 region kept when no face is found
//!
//! [detection]
//! confidence_threshold = 0.6
//! probe_dimension = 1024    # Long edge of the downscaled copy used for probing
//! # model_path = "seeta_fd_frontal_v1.0.bin"
//!
//! [limits]
//! max_files = 100
//! max_file_bytes = 104857600
//! max_archive_uncompressed_bytes = 536870912
//! max_image_dimension = 12000
//!
//! [pdf]
//! dpi = 150
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! item_timeout_ms = 30000
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::types::{OutputFormat, OutputSize, ProcessingOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "idframe.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Pipeline configuration loaded from `idframe.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Output resolution and encoding.
    pub output: OutputConfig,
    /// Crop geometry.
    pub crop: CropConfig,
    /// Face detection and orientation probing.
    pub detection: DetectionConfig,
    /// Batch, file, and decoder limits.
    pub limits: LimitsConfig,
    /// PDF page rasterization.
    pub pdf: PdfConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.width == 0 || self.output.height == 0 {
            return Err(ConfigError::Validation(
                "output.width and output.height must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if !self.crop.margin_ratio.is_finite() || self.crop.margin_ratio < 0.0 {
            return Err(ConfigError::Validation(
                "crop.margin_ratio must be a non-negative number".into(),
            ));
        }
        if !(self.crop.fallback_fraction > 0.0 && self.crop.fallback_fraction <= 1.0) {
            return Err(ConfigError::Validation(
                "crop.fallback_fraction must be in (0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::Validation(
                "detection.confidence_threshold must be in [0, 1]".into(),
            ));
        }
        if self.detection.probe_dimension == 0 {
            return Err(ConfigError::Validation(
                "detection.probe_dimension must be non-zero".into(),
            ));
        }
        let limits = &self.limits;
        if limits.max_files == 0
            || limits.max_file_bytes == 0
            || limits.max_archive_uncompressed_bytes == 0
            || limits.max_image_dimension == 0
        {
            return Err(ConfigError::Validation(
                "limits values must be non-zero".into(),
            ));
        }
        if self.pdf.dpi == 0 {
            return Err(ConfigError::Validation("pdf.dpi must be non-zero".into()));
        }
        if self.processing.item_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "processing.item_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply per-request overrides, then re-validate.
    pub fn with_options(&self, options: &ProcessingOptions) -> Result<Self, ConfigError> {
        let mut config = self.clone();
        if let Some(margin) = options.margin_ratio {
            config.crop.margin_ratio = margin;
        }
        if let Some(width) = options.output_width {
            config.output.width = width;
        }
        if let Some(height) = options.output_height {
            config.output.height = height;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Output resolution and encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    /// JPEG quality (1-100). Ignored for PNG.
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let size = OutputSize::default();
        Self {
            width: size.width,
            height: size.height,
            format: OutputFormat::Jpeg,
            quality: 90,
        }
    }
}

impl OutputConfig {
    pub fn size(&self) -> OutputSize {
        OutputSize {
            width: self.width,
            height: self.height,
        }
    }
}

/// Crop geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropConfig {
    /// Added on each side of the face box: `margin_ratio * width` left and
    /// right, `margin_ratio * height` above and below.
    pub margin_ratio: f64,
    /// Fraction of the largest centered output-aspect region covered by the
    /// fallback box.
    pub fallback_fraction: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            margin_ratio: 0.6,
            fallback_fraction: 0.8,
        }
    }
}

/// Face detection and orientation probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// Detections scoring below this are discarded.
    pub confidence_threshold: f64,
    /// Long edge of the downscaled copy the orientation probes run on.
    pub probe_dimension: u32,
    /// SeetaFace model file for the `rustface` backend.
    pub model_path: Option<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            probe_dimension: 1024,
            model_path: None,
        }
    }
}

/// Batch, file, and decoder limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum artifacts per batch, and maximum entries per ZIP.
    pub max_files: usize,
    /// Maximum size of one artifact or one declared ZIP entry.
    pub max_file_bytes: u64,
    /// Ceiling on the summed declared uncompressed size of one ZIP.
    pub max_archive_uncompressed_bytes: u64,
    /// Decoder limit on either image dimension.
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files: 100,
            max_file_bytes: 100 * 1024 * 1024,
            max_archive_uncompressed_bytes: 512 * 1024 * 1024,
            max_image_dimension: 12_000,
        }
    }
}

/// PDF page rasterization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PdfConfig {
    /// Page 1 is never rendered larger than its MediaBox at this resolution.
    pub dpi: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self { dpi: 150 }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel item workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Per-item time budget in milliseconds.
    pub item_timeout_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            item_timeout_ms: 30_000,
        }
    }
}

impl ProcessingConfig {
    pub fn item_timeout(&self) -> Duration {
        Duration::from_millis(self.item_timeout_ms)
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PipelineConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<PipelineConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: PipelineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`, falling back to stock defaults when
/// the file does not exist.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `idframe.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# idframe configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output image
# ---------------------------------------------------------------------------
[output]
# Fixed output resolution. Every processed photo is exactly this size.
width = 360
height = 480

# "jpeg" or "png".
format = "jpeg"

# JPEG quality (1 = worst, 100 = best). Ignored for PNG.
quality = 90

# ---------------------------------------------------------------------------
# Crop geometry
# ---------------------------------------------------------------------------
[crop]
# Space added around the detected face, relative to the face size:
# margin_ratio * face width left and right, margin_ratio * face height
# above and below (hair and shoulders).
margin_ratio = 0.6

# When no face is found, crop a centered box: the largest region of the
# output aspect ratio that fits, scaled down to this fraction.
fallback_fraction = 0.8

# ---------------------------------------------------------------------------
# Face detection
# ---------------------------------------------------------------------------
[detection]
# Detections scoring below this confidence (0-1) are ignored.
confidence_threshold = 0.6

# Orientation probing runs on a copy downscaled to this long edge.
probe_dimension = 1024

# SeetaFace model file, used when built with the `rustface` feature.
# model_path = "seeta_fd_frontal_v1.0.bin"

# ---------------------------------------------------------------------------
# Limits
# ---------------------------------------------------------------------------
[limits]
# Maximum files per batch (and maximum entries inside one ZIP).
max_files = 100

# Maximum size of one input file, or one declared ZIP entry (100 MiB).
max_file_bytes = 104857600

# Maximum summed declared uncompressed size of one ZIP (512 MiB).
max_archive_uncompressed_bytes = 536870912

# Images wider or taller than this are rejected before decoding.
max_image_dimension = 12000

# ---------------------------------------------------------------------------
# PDF input
# ---------------------------------------------------------------------------
[pdf]
# Only page 1 is used. Its image is capped to the page size at this DPI.
dpi = 150

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel item workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Per-item time budget in milliseconds.
item_timeout_ms = 30000
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_id_photo_geometry() {
        let config = PipelineConfig::default();
        assert_eq!(config.output.width, 360);
        assert_eq!(config.output.height, 480);
        assert_eq!(config.output.format, OutputFormat::Jpeg);
        assert_eq!(config.output.quality, 90);
        assert_eq!(config.crop.margin_ratio, 0.6);
    }

    #[test]
    fn default_config_has_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.limits.max_files, 100);
        assert_eq!(config.limits.max_file_bytes, 100 * 1024 * 1024);
        assert_eq!(config.pdf.dpi, 150);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[crop]
margin_ratio = 0.4
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.crop.margin_ratio, 0.4);
        // Defaults preserved
        assert_eq!(config.crop.fallback_fraction, 0.8);
        assert_eq!(config.output.width, 360);
    }

    #[test]
    fn parse_output_format() {
        let toml = r#"
[output]
format = "png"
"#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.output.format, OutputFormat::Png);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.output.width, 360);
        assert_eq!(config.detection.confidence_threshold, 0.6);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"
[detection]
confidence_threshold = 0.75

[limits]
max_files = 10
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.detection.confidence_threshold, 0.75);
        assert_eq!(config.limits.max_files, 10);
        // Unspecified values should be defaults
        assert_eq!(config.detection.probe_dimension, 1024);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "this is not valid toml [[[").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[output]\nquality = 200\n").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unknown_key_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[crop]\nmargin = 0.5\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    // =========================================================================
    // Processing config tests
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig::default();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
            ..Default::default()
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
            ..Default::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn effective_threads_never_zero() {
        let config = ProcessingConfig {
            max_processes: Some(0),
            ..Default::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"quality = 90"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"quality = 70"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("quality").unwrap().as_integer(), Some(70));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[output]
width = 360
quality = 90
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[output]
quality = 70
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let output = merged.get("output").unwrap();
        assert_eq!(output.get("quality").unwrap().as_integer(), Some(70));
        // width preserved from base
        assert_eq!(output.get("width").unwrap().as_integer(), Some(360));
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = PipelineConfig::default();
        config.output.quality = 100;
        assert!(config.validate().is_ok());
        config.output.quality = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quality"));
    }

    #[test]
    fn validate_rejects_zero_output_dimension() {
        let mut config = PipelineConfig::default();
        config.output.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_margin() {
        let mut config = PipelineConfig::default();
        config.crop.margin_ratio = -0.1;
        assert!(config.validate().is_err());
        config.crop.margin_ratio = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_fallback_fraction_out_of_range() {
        let mut config = PipelineConfig::default();
        config.crop.fallback_fraction = 0.0;
        assert!(config.validate().is_err());
        config.crop.fallback_fraction = 1.0;
        assert!(config.validate().is_ok());
        config.crop.fallback_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_threshold_out_of_range() {
        let mut config = PipelineConfig::default();
        config.detection.confidence_threshold = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = PipelineConfig::default();
        config.limits.max_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn options_override_config() {
        let config = PipelineConfig::default();
        let options = ProcessingOptions {
            margin_ratio: Some(0.3),
            output_width: Some(300),
            output_height: Some(400),
            archive_name: None,
        };
        let merged = config.with_options(&options).unwrap();
        assert_eq!(merged.crop.margin_ratio, 0.3);
        assert_eq!(merged.output.size(), OutputSize { width: 300, height: 400 });
    }

    #[test]
    fn options_are_validated() {
        let options = ProcessingOptions {
            output_width: Some(0),
            ..Default::default()
        };
        assert!(PipelineConfig::default().with_options(&options).is_err());
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: PipelineConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config.output.width, 360);
        assert_eq!(config.output.quality, 90);
        assert_eq!(config.crop.fallback_fraction, 0.8);
        assert_eq!(config.limits.max_archive_uncompressed_bytes, 512 * 1024 * 1024);
        assert_eq!(config.processing.item_timeout_ms, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in [
            "[output]",
            "[crop]",
            "[detection]",
            "[limits]",
            "[pdf]",
            "[processing]",
        ] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        for section in ["output", "crop", "detection", "limits", "pdf", "processing"] {
            assert!(val.get(section).is_some(), "missing {section}");
        }
    }
}
