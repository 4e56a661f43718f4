//! Image processing: orientation, face location, crop, resize, encode.
//!
//! | Stage | Crate / function |
//! |---|---|
//! | **Orientation** | four quarter-turn probes on a `Triangle`-downscaled copy |
//! | **Face location** | [`FaceLocator`] trait; `rustface` behind a feature flag |
//! | **Crop** | integer aspect-unit geometry, translate before shrink |
//! | **Resize** | `resize_exact` with `Lanczos3` |
//! | **Encode** | `JpegEncoder` / `PngEncoder` from the `image` crate |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for crop geometry (unit testable)
//! - **Parameters**: Data structures describing each stage
//! - **Detector**: [`FaceLocator`] trait, [`NullLocator`], face selection
//! - **Orientation / Crop / Encode**: the stages themselves

mod calculations;
pub mod crop;
pub mod detector;
pub mod encode;
pub mod orientation;
mod params;
#[cfg(feature = "rustface")]
pub mod rustface_backend;

pub use calculations::aspect_unit;
pub use crop::{CropAnchor, fallback_face_box, plan_crop};
pub use detector::{FaceLocator, LocatorError, NullLocator, best_face, locator_from_config};
pub use encode::{encode_frame, render_crop};
pub use orientation::{Oriented, RotationScore, detect_orientation};
pub use params::{CropParams, DetectionParams, EncodeParams, Quality, StageParams};
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceLocator;
