//! Page-1 PDF rasterization.
//!
//! A submitted PDF is a scanned or exported photo, so page 1 is rendered by
//! decoding the largest image painted on it. Only objects reachable from
//! page 1's resources are ever decoded; later pages are enumerated (to find
//! page 1) but never touched.
//!
//! Supported image streams:
//!
//! | Filter | Colour space |
//! |---|---|
//! | `DCTDecode` | any (JPEG decoder) |
//! | `JPXDecode` | when the image decoder accepts it |
//! | `FlateDecode` / none | 8-bit `DeviceRGB`, `DeviceGray`, `DeviceCMYK`, `ICCBased` |
//!
//! The decoded image is downscaled (never upscaled) to the page MediaBox at
//! the configured DPI.

use super::decode_image;
use crate::config::PipelineConfig;
use crate::error::ItemError;
use flate2::read::ZlibDecoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, instrument};

/// US Letter in points; used when no MediaBox is found.
const DEFAULT_MEDIA_BOX: (f64, f64) = (612.0, 792.0);
const POINTS_PER_INCH: f64 = 72.0;
/// Parent chain and Form XObject nesting are followed at most this deep.
const MAX_DEPTH: usize = 16;

/// Decode page 1 of a PDF into an image.
#[instrument(skip_all, fields(pdf_bytes = bytes.len()))]
pub fn rasterize_first_page(
    bytes: &[u8],
    config: &PipelineConfig,
) -> Result<DynamicImage, ItemError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| ItemError::CorruptArtifact(format!("pdf: {e}")))?;

    let pages = doc.get_pages();
    let page_count = pages.len();
    let page_id = pages
        .into_values()
        .next()
        .ok_or_else(|| ItemError::CorruptArtifact("PDF has no pages".to_string()))?;
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| ItemError::CorruptArtifact(format!("pdf page 1: {e}")))?;
    debug!(page_count, "using page 1");

    let resources = inherited(&doc, page, b"Resources").ok_or_else(|| {
        ItemError::CorruptArtifact("page 1 has no resources".to_string())
    })?;

    let mut images = Vec::new();
    let mut visited = HashSet::new();
    collect_images(&doc, resources, 0, &mut visited, &mut images);

    // Largest painted image; ties go to the lowest object id.
    let (stream_id, width, height) = images
        .into_iter()
        .max_by(|a, b| {
            let area = |(_, w, h): &(ObjectId, u32, u32)| u64::from(*w) * u64::from(*h);
            area(a).cmp(&area(b)).then(b.0.cmp(&a.0))
        })
        .ok_or_else(|| ItemError::CorruptArtifact("page 1 contains no image".to_string()))?;

    let max_dimension = config.limits.max_image_dimension;
    if width > max_dimension || height > max_dimension {
        return Err(ItemError::SizeLimitExceeded(format!(
            "page image is {width}x{height}; the limit is {max_dimension} per side"
        )));
    }

    let stream = doc
        .get_object(stream_id)
        .and_then(Object::as_stream)
        .map_err(|e| ItemError::CorruptArtifact(format!("pdf image: {e}")))?;
    let image = decode_image_stream(&doc, stream, width, height, config)?;

    let (media_w, media_h) = media_box(&doc, page);
    Ok(cap_to_page(image, media_w, media_h, config.pdf.dpi))
}

/// Follow `Parent` links for an inheritable page attribute.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut dict = page;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}

/// Gather `(id, width, height)` of every image XObject in `resources`,
/// descending into Form XObjects.
fn collect_images(
    doc: &Document,
    resources: &Object,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<(ObjectId, u32, u32)>,
) {
    if depth > MAX_DEPTH {
        return;
    }
    let Some(xobjects) = resources
        .as_dict()
        .ok()
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|x| resolve(doc, x))
        .and_then(|x| x.as_dict().ok())
    else {
        return;
    };

    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        if !visited.insert(id) {
            continue;
        }
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        match name_of(doc, stream.dict.get(b"Subtype").ok()).as_deref() {
            Some("Image") => {
                let dimension = |key: &[u8]| {
                    integer(doc, stream.dict.get(key).ok())
                        .and_then(|v| u32::try_from(v).ok())
                        .filter(|v| *v > 0)
                };
                if let (Some(w), Some(h)) = (dimension(b"Width"), dimension(b"Height")) {
                    out.push((id, w, h));
                }
            }
            Some("Form") => {
                let nested = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| resolve(doc, r));
                if let Some(res) = nested {
                    collect_images(doc, res, depth + 1, visited, out);
                }
            }
            _ => {}
        }
    }
}

fn name_of(doc: &Document, obj: Option<&Object>) -> Option<String> {
    match resolve(doc, obj?)? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
        Object::Array(items) => name_of(doc, items.first()),
        _ => None,
    }
}

fn integer(doc: &Document, obj: Option<&Object>) -> Option<i64> {
    match resolve(doc, obj?)? {
        Object::Integer(i) => Some(*i),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

fn number(doc: &Document, obj: &Object) -> Option<f64> {
    match resolve(doc, obj)? {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Page size in points.
fn media_box(doc: &Document, page: &Dictionary) -> (f64, f64) {
    let corners = inherited(doc, page, b"MediaBox")
        .and_then(|b| b.as_array().ok())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| number(doc, item))
                .collect::<Vec<_>>()
        });
    match corners.as_deref() {
        Some([x0, y0, x1, y1]) if x1 != x0 && y1 != y0 => ((x1 - x0).abs(), (y1 - y0).abs()),
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// Downscale so the image is no larger than the page at `dpi`.
fn cap_to_page(image: DynamicImage, media_w: f64, media_h: f64, dpi: u32) -> DynamicImage {
    let max_w = (media_w / POINTS_PER_INCH * f64::from(dpi)).round().max(1.0) as u32;
    let max_h = (media_h / POINTS_PER_INCH * f64::from(dpi)).round().max(1.0) as u32;
    if image.width() <= max_w && image.height() <= max_h {
        return image;
    }
    debug!(
        from = ?(image.width(), image.height()),
        cap = ?(max_w, max_h),
        "capping page image to page size"
    );
    image.resize(max_w, max_h, FilterType::Lanczos3)
}

/// Decode an image XObject stream into pixels.
fn decode_image_stream(
    doc: &Document,
    stream: &Stream,
    width: u32,
    height: u32,
    config: &PipelineConfig,
) -> Result<DynamicImage, ItemError> {
    let filters = filter_names(doc, &stream.dict);
    let max_dimension = config.limits.max_image_dimension;

    // Any Flate layers come first; a DCT/JPX layer, if present, is last.
    let (encoded, final_filter) = match filters.split_last() {
        Some((last, inner)) if last == "DCTDecode" || last == "JPXDecode" => {
            (unflate(&stream.content, inner, config.limits.max_file_bytes)?, Some(last))
        }
        _ => {
            let channels = channels(doc, &stream.dict)?;
            let expected = u64::from(width) * u64::from(height) * channels as u64;
            (unflate(&stream.content, &filters, expected)?, None)
        }
    };

    match final_filter.map(String::as_str) {
        Some("DCTDecode") => decode_image(&encoded, max_dimension),
        Some(_) => decode_image(&encoded, max_dimension).map_err(|e| match e {
            ItemError::UnsupportedFormat(_) => {
                ItemError::UnsupportedFormat("JPEG 2000 page images are not supported".into())
            }
            other => other,
        }),
        None => raw_samples(doc, &stream.dict, encoded, width, height),
    }
}

/// Apply `filters` (all must be `FlateDecode`), producing at most `limit` bytes.
fn unflate(content: &[u8], filters: &[String], limit: u64) -> Result<Vec<u8>, ItemError> {
    let mut data = content.to_vec();
    for filter in filters {
        if filter != "FlateDecode" {
            return Err(ItemError::UnsupportedFormat(format!(
                "pdf image filter {filter}"
            )));
        }
        let mut decoded = Vec::new();
        ZlibDecoder::new(data.as_slice())
            .take(limit)
            .read_to_end(&mut decoded)
            .map_err(|e| ItemError::CorruptArtifact(format!("pdf image stream: {e}")))?;
        data = decoded;
    }
    Ok(data)
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter").ok().and_then(|f| resolve(doc, f)) {
        Some(Object::Name(n)) => vec![String::from_utf8_lossy(n).into_owned()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match resolve(doc, item)? {
                Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn colour_space(doc: &Document, dict: &Dictionary) -> Option<String> {
    name_of(doc, dict.get(b"ColorSpace").ok())
}

/// Components per sample for the supported colour spaces.
fn channels(doc: &Document, dict: &Dictionary) -> Result<usize, ItemError> {
    match colour_space(doc, dict).as_deref() {
        Some("DeviceRGB") | Some("RGB") => Ok(3),
        Some("DeviceGray") | Some("G") => Ok(1),
        Some("DeviceCMYK") | Some("CMYK") => Ok(4),
        Some("ICCBased") => Ok(icc_components(doc, dict).unwrap_or(3)),
        other => Err(ItemError::UnsupportedFormat(format!(
            "pdf colour space {}",
            other.unwrap_or("(none)")
        ))),
    }
}

/// `N` of an `[/ICCBased <stream>]` colour space.
fn icc_components(doc: &Document, dict: &Dictionary) -> Option<usize> {
    let cs = resolve(doc, dict.get(b"ColorSpace").ok()?)?;
    let profile = cs.as_array().ok()?.get(1)?;
    let profile = resolve(doc, profile)?.as_stream().ok()?;
    let n = integer(doc, profile.dict.get(b"N").ok())?;
    usize::try_from(n).ok().filter(|n| matches!(n, 1 | 3 | 4))
}

/// Interpret unfiltered 8-bit samples.
fn raw_samples(
    doc: &Document,
    dict: &Dictionary,
    data: Vec<u8>,
    width: u32,
    height: u32,
) -> Result<DynamicImage, ItemError> {
    let bits = integer(doc, dict.get(b"BitsPerComponent").ok()).unwrap_or(8);
    if bits != 8 {
        return Err(ItemError::UnsupportedFormat(format!(
            "{bits}-bit pdf image samples"
        )));
    }
    let channels = channels(doc, dict)?;
    let pixels = width as usize * height as usize;
    let expected = pixels * channels;
    if data.len() < expected {
        return Err(ItemError::CorruptArtifact(format!(
            "pdf image has {} bytes, expected {expected}",
            data.len()
        )));
    }
    let mut data = data;
    data.truncate(expected);

    let short = || ItemError::CorruptArtifact("pdf image buffer size mismatch".to_string());
    match channels {
        1 => GrayImage::from_raw(width, height, data)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(short),
        3 => RgbImage::from_raw(width, height, data)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(short),
        _ => {
            let rgb = data
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 1.0 - f32::from(cmyk[3]) / 255.0;
                    [cmyk[0], cmyk[1], cmyk[2]]
                        .map(|c| ((1.0 - f32::from(c) / 255.0) * k * 255.0).round() as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(short)
        }
    }
}
