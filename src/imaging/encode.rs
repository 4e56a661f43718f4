//! Crop, resize, and encode.
//!
//! | Step | Crate / function |
//! |---|---|
//! | Crop | `DynamicImage::crop_imm` |
//! | Resize | `resize_exact` with `Lanczos3` |
//! | Alpha | flattened onto white before encoding |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality from config) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//!
//! Encoders are fed raw RGB8 buffers with fixed settings, so the same pixels
//! always produce the same bytes.

use super::params::EncodeParams;
use crate::error::ItemError;
use crate::types::{CropPlan, EncodedImage, OutputFormat, RasterFrame};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};

/// Cut `plan.rect` out of the frame and scale it to exactly `plan.output`.
pub fn render_crop(frame: &RasterFrame, plan: &CropPlan) -> DynamicImage {
    let rect = plan.rect;
    let cropped = frame.image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    if (rect.width, rect.height) == (plan.output.width, plan.output.height) {
        return cropped;
    }
    cropped.resize_exact(plan.output.width, plan.output.height, FilterType::Lanczos3)
}

/// RGB8 copy of `image`, compositing any alpha channel over white.
pub fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Encode `image` in the configured format.
pub fn encode_frame(image: &DynamicImage, params: &EncodeParams) -> Result<EncodedImage, ItemError> {
    let rgb = flatten_alpha(image);
    let (width, height) = rgb.dimensions();
    let mut bytes = Vec::new();

    let result = match params.format {
        OutputFormat::Jpeg => JpegEncoder::new_with_quality(&mut bytes, params.quality.value())
            .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8),
        OutputFormat::Png => PngEncoder::new(&mut bytes).write_image(
            rgb.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
    };
    result.map_err(|e| {
        ItemError::InternalEncodeFailure(format!("{} encode failed: {e}", params.format.extension()))
    })?;

    if bytes.is_empty() {
        return Err(ItemError::InternalEncodeFailure(
            "encoder produced no bytes".into(),
        ));
    }
    Ok(EncodedImage {
        bytes,
        width,
        height,
        format: params.format,
    })
}
