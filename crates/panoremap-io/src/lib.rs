//! panoremap-io: filesystem collaborators and batch job orchestration.
//!
//! The pure engines live in `panoremap-core`; this crate supplies what
//! they deliberately leave out: JSON document loading and atomic
//! persistence, id-mask PNG files, the Cityscapes-style label-table text
//! format, and the three batch jobs (`remap`, `delta`, `segmaps`) that
//! drive the engines across a whole annotation set in parallel.
//!
//! All persistence is write-new-then-rename: an interrupted job never
//! leaves a half-written document or mask behind.

use std::path::PathBuf;

pub mod delta;
pub mod document;
pub mod labels;
pub mod mask_files;
pub mod remap;
pub mod segmaps;

pub use delta::{DeltaOptions, run_delta};
pub use remap::{RemapOptions, run_remap};
pub use segmaps::{SegmapOptions, run_segmaps};

/// Errors of the I/O layer and the jobs built on it.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A required file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the unreadable file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A file could not be written or renamed into place.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Path of the unwritable file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A JSON document could not be parsed or encoded.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// Path of the offending document.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// An image file could not be decoded or encoded.
    #[error("failed to process image {path}: {source}")]
    Image {
        /// Path of the offending image.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// A pixel buffer does not match its stated dimensions.
    #[error("pixel buffer does not match dimensions for {path}")]
    PixelBuffer {
        /// Path the buffer was destined for.
        path: PathBuf,
    },

    /// The mask root directory does not exist.
    #[error("mask directory {0} is invalid")]
    MissingMaskRoot(PathBuf),

    /// A label-table line could not be parsed.
    #[error("label table line {line}: {message}")]
    LabelTable {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A segmentation-export job was requested with no output selected.
    #[error("no output operation selected")]
    NothingToExport,

    /// A configuration error raised by the engines.
    #[error(transparent)]
    Remap(#[from] panoremap_core::RemapError),
}
