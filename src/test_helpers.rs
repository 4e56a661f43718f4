//! Shared test utilities for the idframe test suite.
//!
//! Fixture builders produce real encoded bytes (JPEG, PNG, ZIP, PDF) in
//! memory, and [`MarkerLocator`] stands in for a face detector so orientation
//! and cropping can be asserted without a model file.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let jpeg = jpeg_bytes(60, 80, [200, 200, 200]);
//! let bundle = zip_bytes(&[("a.jpg", jpeg.as_slice())]);
//! let frame = marker_frame(150, 200, Rotation::R90);
//! assert_eq!(MarkerLocator.locate(&frame).len(), 1);
//! ```

use crate::imaging::FaceLocator;
use crate::types::{FaceBox, Provenance, RasterFrame, Rotation};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// =========================================================================
// Encoded images
// =========================================================================

pub fn png_bytes(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(colour));
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

pub fn jpeg_bytes(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
    encode_jpeg(&RgbImage::from_pixel(width, height, Rgb(colour)))
}

pub fn encode_jpeg(img: &RgbImage) -> Vec<u8> {
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 95)
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
    out
}

// =========================================================================
// ZIP bundles
// =========================================================================

/// Deflated ZIP with the given `(path, content)` entries, in order.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Overwrite the uncompressed size of every entry, in both the central
/// directory and the local headers, as a zip bomb would.
pub fn forge_declared_size(mut bytes: Vec<u8>, size: u32) -> Vec<u8> {
    const CENTRAL: [u8; 4] = 0x0201_4b50u32.to_le_bytes();
    const LOCAL: [u8; 4] = 0x0403_4b50u32.to_le_bytes();
    let forged = size.to_le_bytes();
    let mut i = 0;
    while i + 4 <= bytes.len() {
        let offset = match &bytes[i..i + 4] {
            s if s == CENTRAL => Some(24),
            s if s == LOCAL => Some(22),
            _ => None,
        };
        if let Some(offset) = offset {
            bytes[i + offset..i + offset + 4].copy_from_slice(&forged);
            i += 4;
        } else {
            i += 1;
        }
    }
    bytes
}

// =========================================================================
// PDFs
// =========================================================================

/// One page per JPEG, each painting its image full-page. Pages keep their
/// own resources so nothing from later pages is reachable from page 1.
/// An empty slice gives a document with zero pages.
pub fn pdf_bytes(jpegs: &[Vec<u8>]) -> Vec<u8> {
    let images = jpegs
        .iter()
        .map(|jpeg| {
            let (width, height) = image::load_from_memory(jpeg)
                .map(|img| (img.width(), img.height()))
                .unwrap_or((10, 10));
            let mut dict = image_dict(width, height, "DeviceRGB");
            dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
            (Stream::new(dict, jpeg.clone()), width, height)
        })
        .collect();
    build_pdf(images)
}

/// One page with a raw 8-bit image stream, Flate-compressed.
pub fn pdf_with_raw_image(width: u32, height: u32, colour_space: &str, samples: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(samples).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut dict = image_dict(width, height, colour_space);
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    build_pdf(vec![(Stream::new(dict, compressed), width, height)])
}

fn image_dict(width: u32, height: u32, colour_space: &str) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(i64::from(width)));
    dict.set("Height", Object::Integer(i64::from(height)));
    dict.set("ColorSpace", Object::Name(colour_space.as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict
}

fn build_pdf(images: Vec<(Stream, u32, u32)>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for (stream, width, height) in images {
        let image_id = doc.add_object(stream);

        let mut xobjects = Dictionary::new();
        xobjects.set("Im0", Object::Reference(image_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let ops = format!("q {width} 0 0 {height} 0 0 cm /Im0 Do Q");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(i64::from(width)),
                Object::Integer(i64::from(height)),
            ]),
        );
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Reference(content_id));
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

// =========================================================================
// Marker faces
// =========================================================================

const BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);
const FACE: Rgb<u8> = Rgb([230, 30, 30]);
const HAIR: Rgb<u8> = Rgb([30, 30, 230]);

/// Upright marker image: a red "face" square of side `width / 3`, centered
/// horizontally with its top at 35% of the height, under a blue "hair" band.
pub fn marker_image(width: u32, height: u32) -> RgbImage {
    let side = (width / 3).max(2);
    let left = (width - side.min(width)) / 2;
    let top = height * 35 / 100;
    let hair = side / 2;
    RgbImage::from_fn(width, height, |x, y| {
        let in_column = x >= left && x < left + side;
        if in_column && y >= top && y < top + side {
            FACE
        } else if in_column && y + hair >= top && y < top {
            HAIR
        } else {
            BACKGROUND
        }
    })
}

/// Marker image turned clockwise by `rotation`, as a frame.
pub fn marker_frame(width: u32, height: u32, rotation: Rotation) -> RasterFrame {
    let image = rotation.apply(DynamicImage::ImageRgb8(marker_image(width, height)));
    RasterFrame::new(
        image,
        Provenance {
            artifact_id: "marker".into(),
            index: None,
            rotation: Rotation::R0,
        },
    )
}

/// Finds the red square. Confidence grows with how much of the strip just
/// above the square is blue, so only the upright orientation scores high.
pub struct MarkerLocator;

impl FaceLocator for MarkerLocator {
    fn locate(&self, frame: &RasterFrame) -> Vec<FaceBox> {
        let rgb = frame.image.to_rgb8();
        let is = |p: &Rgb<u8>, hi: usize| {
            p.0.iter()
                .enumerate()
                .all(|(i, v)| if i == hi { *v > 180 } else { *v < 80 })
        };

        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in rgb.enumerate_pixels() {
            if is(p, 0) {
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        let Some((x0, y0, x1, y1)) = bounds else {
            return Vec::new();
        };
        let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);

        let strip = (h / 4).max(1);
        let confidence = if y0 < strip {
            0.0
        } else {
            let mut blue = 0u32;
            for y in y0 - strip..y0 {
                for x in x0..=x1 {
                    if is(rgb.get_pixel(x, y), 2) {
                        blue += 1;
                    }
                }
            }
            0.2 + 0.8 * f64::from(blue) / f64::from(strip * w)
        };

        vec![FaceBox::new(
            f64::from(x0),
            f64::from(y0),
            f64::from(w),
            f64::from(h),
            confidence,
        )]
    }

    fn name(&self) -> &'static str {
        "marker"
    }
}

#[test]
fn marker_locator_scores_upright_highest() {
    let upright = MarkerLocator.locate(&marker_frame(150, 200, Rotation::R0));
    let sideways = MarkerLocator.locate(&marker_frame(150, 200, Rotation::R90));
    assert!(upright[0].confidence > 0.9);
    assert!(sideways[0].confidence < 0.5);
}
