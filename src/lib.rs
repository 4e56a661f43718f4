//! # idframe
//!
//! Batch ID-photo framing. Takes candidate photographs as single images, PDFs,
//! or ZIP bundles; finds the face in each; turns the picture upright; and crops
//! and resizes it to a fixed ID-card size (360×480 by default).
//!
//! # Architecture: Per-Item Pipelines
//!
//! ```text
//! artifacts ──▶ sniff ──▶ extract ──▶ orient ──▶ locate face ──▶ plan crop ──▶ encode
//!              (magic     (image /    (4 quarter   (best box or   (margin,       (Lanczos3,
//!               bytes)     PDF p.1 /   turns)       fallback)      3:4 units)     JPEG/PNG)
//!                          ZIP entry)
//! ```
//!
//! The batch orchestrator in [`process`] plans every item up front (sizes,
//! formats, ZIP central directories), then runs one independent pipeline per
//! item on a worker pool and joins the results back into encounter order. A
//! failing item becomes an `Error` record with a log line; it never aborts the
//! batch.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sniff`] | Classifies bytes as image / PDF / ZIP / unknown from magic bytes |
//! | [`extract`] | Turns artifacts into per-item work; PDF page 1 and bounded ZIP inflation |
//! | [`imaging`] | Orientation, face location, crop geometry, resize and encode |
//! | [`process`] | Batch orchestration, cancellation, progress events, response shaping |
//! | [`config`] | `idframe.toml` loading, merging over stock defaults, validation |
//! | [`types`] | Data model and the request/response contract |
//! | [`error`] | Item and batch error taxonomy |
//! | [`naming`] | Output and archive filenames |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Decides the Type
//!
//! Uploads are classified by their leading bytes. A `.jpg` that is really a
//! ZIP is treated as a ZIP, and a file that matches no supported signature is
//! rejected as an item error before anything tries to decode it.
//!
//! ## Limits Before Bytes
//!
//! Batch size, per-file size, and ZIP sizes are checked against declared
//! values before any decompression. Inflation then stops one byte past each
//! entry's declared size, so a forged size field is caught rather than
//! silently truncated.
//!
//! ## Pluggable Face Detection
//!
//! The pipeline depends only on the [`imaging::FaceLocator`] trait. Without a
//! detection model every item takes the centered fallback crop; with the
//! `rustface` feature and a SeetaFace model file, faces are located for real.
//!
//! ## Deterministic Output
//!
//! Rotation ties, multiple faces, output names, and the archive timestamp are
//! all resolved by fixed rules, so the same input bytes always give the same
//! output bytes.

pub mod config;
pub mod error;
pub mod extract;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod sniff;
pub mod types;

pub use error::{BatchError, ItemError, ItemWarning};
pub use process::{CancelFlag, ItemEvent, build_response, process_batch, process_batch_with_events};

#[cfg(test)]
pub(crate) mod test_helpers;
