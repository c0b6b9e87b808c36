//! panoremap-core: annotation remapping and delta-validation engines (sans-IO).
//!
//! Reconciles panoptic/instance segmentation annotation sets across
//! changing category taxonomies and across incremental correction batches:
//!
//! - [`mapping`] resolves a unified label policy into a source→target
//!   category table, once per job;
//! - [`consolidate`] rewrites one image's segment list into the target
//!   taxonomy, merging segments that collapse onto the same background
//!   ("stuff") category and planning the matching id-mask rewrite;
//! - [`delta`] cross-validates external correction records against the
//!   current segments by geometry and applies the accepted changes;
//! - [`geometry`] and [`mask`] are the shared leaves: integer box
//!   arithmetic and the 24-bit id-mask codec.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! documents and images and returns structured data. All filesystem
//! interaction lives in `panoremap-io`.

pub mod consolidate;
pub mod delta;
pub mod geometry;
pub mod mapping;
pub mod mask;
pub mod report;
pub mod types;

pub use consolidate::{Consolidation, MaskRelabel, apply_relabels, consolidate};
pub use delta::{
    PatchOutcome, PatchTarget, RejectReason, annotation_key, canonical_label, patch_segments,
};
pub use mapping::{CategoryMapping, PolicyDocument, countable_index};
pub use mask::IdMask;
pub use report::{JobReport, ReportEntry};
pub use types::{
    AnnotationRecord, BBox, Category, CategoryRef, DeltaDocument, DeltaRecord, DeltaSegment,
    ImageEntry, ImageId, PanopticDocument, PolygonFile, PolygonObject, RemapError, SegmentInfo,
    VOID_ID,
};
