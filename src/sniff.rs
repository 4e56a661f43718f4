//! Content-based media classification.
//!
//! The declared filename never decides how bytes are treated: a `.jpg` that
//! starts with a ZIP local-file header is a ZIP. Classification is soft, so
//! anything unrecognized is [`MediaKind::Unknown`] and the item fails later
//! with `UnsupportedFormat`.

use crate::types::MediaKind;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
const PDF_MAGIC: &[u8] = b"%PDF-";
/// Local file header, empty archive, and spanned-archive markers.
const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// PDF writers may put junk before the header; readers accept it within 1 KiB.
const PDF_HEADER_WINDOW: usize = 1024;

/// Image extensions accepted inside ZIP bundles.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Classify `bytes` by signature.
pub fn sniff(bytes: &[u8]) -> MediaKind {
    if bytes.starts_with(JPEG_MAGIC) || bytes.starts_with(PNG_MAGIC) {
        MediaKind::Image
    } else if ZIP_MAGICS.iter().any(|magic| bytes.starts_with(magic)) {
        MediaKind::Zip
    } else if has_pdf_header(bytes) {
        MediaKind::Pdf
    } else {
        MediaKind::Unknown
    }
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window
        .windows(PDF_MAGIC.len())
        .any(|candidate| candidate == PDF_MAGIC)
}

impl MediaKind {
    /// Whether a ZIP entry name looks like a supported image.
    ///
    /// Names only pre-filter archive entries; the entry bytes are still
    /// sniffed before decoding.
    pub fn is_supported_extension(name: &str) -> bool {
        std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}
