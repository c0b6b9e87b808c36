//! Delta cross-validation and patching: apply a batch of external
//! correction records to existing segments, accepting each correction only
//! when the geometry it recorded still matches the segment it targets.
//!
//! The two store dialects are tagged explicitly in [`PatchTarget`] and
//! resolved once by the caller at load time: COCO-panoptic stores are
//! id-tagged, `category_id`-labelled, and bbox-backed; Cityscapes-style
//! polygon stores are positionally indexed, `label`-labelled, and
//! polygon-backed.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::geometry::{bbox_of_points, max_corner_displacement};
use crate::types::{BBox, CategoryRef, DeltaSegment, PolygonObject, SegmentInfo};

/// Why a delta change was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    /// The recorded geometry (including the visible-bbox fallback) no
    /// longer matches the current segment.
    BboxMismatch,
    /// The recorded previous category does not equal the current one.
    CategoryMismatch,
    /// No current segment carries the delta's id (or position).
    UnknownSegment,
    /// The delta's category value has the wrong shape for the store
    /// (a raw label against an id-labelled store, or vice versa).
    UnresolvedCategory,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BboxMismatch => "bbox mismatch",
            Self::CategoryMismatch => "category mismatch",
            Self::UnknownSegment => "segment not found",
            Self::UnresolvedCategory => "unresolved category",
        })
    }
}

/// One rejected change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchError {
    /// Id (or position) the delta targeted.
    pub id: i64,
    /// Why the change was skipped.
    pub reason: RejectReason,
}

/// Outcome of patching one matched record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchOutcome {
    /// Number of accepted changes.
    pub success_count: usize,
    /// Rejected changes, in delta order.
    pub errors: Vec<PatchError>,
}

/// The segment store of one matched record, tagged by dialect.
#[derive(Debug)]
pub enum PatchTarget<'a> {
    /// COCO-panoptic segments: located by id, labelled by category id.
    Panoptic(&'a mut Vec<SegmentInfo>),
    /// Cityscapes-style polygon objects: located by list position,
    /// labelled by raw label string.
    Polygons(&'a mut Vec<PolygonObject>),
}

/// Apply the changes of one delta record to the current segments.
///
/// With `tolerance >= 0` each change is cross-validated before it is
/// applied: the displacement between the recorded bbox and the current
/// geometry (the segment's own bbox, else the bounding box of its stored
/// polygon) must not exceed `tolerance`; an over-tolerance primary bbox is
/// retried with the delta's visible bbox when one is supplied. The
/// recorded previous category must equal the current one. Changes failing
/// either check are skipped whole, with no partial mutation. Segments with no
/// derivable geometry are exempt from both checks, since there is nothing
/// to validate against. A negative `tolerance` disables validation
/// entirely.
///
/// Accepted changes overwrite the category/label, copy the crowd flag when
/// both sides define one, and count toward `success_count`.
pub fn patch_segments(
    target: PatchTarget<'_>,
    deltas: &[DeltaSegment],
    tolerance: i64,
) -> PatchOutcome {
    let mut outcome = PatchOutcome::default();
    match target {
        PatchTarget::Panoptic(segments) => {
            let index: HashMap<i64, usize> = segments
                .iter()
                .enumerate()
                .map(|(i, s)| (s.id, i))
                .collect();
            for delta in deltas {
                let Some(&slot) = index.get(&delta.id) else {
                    outcome.reject(delta.id, RejectReason::UnknownSegment);
                    continue;
                };
                let seg = &mut segments[slot];
                let current = CategoryRef::Id(seg.category_id);
                if let Some(reason) = validate(delta, seg.bbox, &current, tolerance) {
                    outcome.reject(delta.id, reason);
                    continue;
                }
                let CategoryRef::Id(new_id) = delta.new else {
                    outcome.reject(delta.id, RejectReason::UnresolvedCategory);
                    continue;
                };
                seg.category_id = new_id;
                if let Some(crowd) = delta.is_crowd {
                    seg.iscrowd = crowd;
                }
                outcome.success_count += 1;
            }
        }
        PatchTarget::Polygons(objects) => {
            for delta in deltas {
                let Some(object) = usize::try_from(delta.id)
                    .ok()
                    .and_then(|slot| objects.get_mut(slot))
                else {
                    outcome.reject(delta.id, RejectReason::UnknownSegment);
                    continue;
                };
                let bbox = bbox_of_points(&object.polygon);
                let current = CategoryRef::Label(object.label.clone());
                if let Some(reason) = validate(delta, bbox, &current, tolerance) {
                    outcome.reject(delta.id, reason);
                    continue;
                }
                let CategoryRef::Label(ref new_label) = delta.new else {
                    outcome.reject(delta.id, RejectReason::UnresolvedCategory);
                    continue;
                };
                object.label = new_label.clone();
                if object.is_crowd.is_some() && delta.is_crowd.is_some() {
                    object.is_crowd = delta.is_crowd;
                }
                outcome.success_count += 1;
            }
        }
    }
    outcome
}

impl PatchOutcome {
    fn reject(&mut self, id: i64, reason: RejectReason) {
        self.errors.push(PatchError { id, reason });
    }
}

/// Cross-validate one change; `None` means accepted.
fn validate(
    delta: &DeltaSegment,
    current_bbox: Option<BBox>,
    current_category: &CategoryRef,
    tolerance: i64,
) -> Option<RejectReason> {
    if tolerance < 0 {
        return None;
    }
    let current_bbox = current_bbox?;
    let mut diff = max_corner_displacement(&[delta.bbox, current_bbox]);
    if diff > tolerance {
        if let Some(vis) = delta.bbox_vis {
            diff = max_corner_displacement(&[vis, current_bbox]);
        }
    }
    if diff > tolerance {
        return Some(RejectReason::BboxMismatch);
    }
    if delta.old != *current_category {
        return Some(RejectReason::CategoryMismatch);
    }
    None
}

/// Normalized lookup key for an annotation file or image id.
///
/// Strips the extension and the dataset suffixes `_polygons`, `_gtfine`
/// and `_gtcoarse` from the case-folded base name. With `check_folder`,
/// base names that are purely numeric (ignoring `_` and `frame`) are
/// prefixed with their parent directory name, disambiguating datasets
/// that reuse the same base names across folders.
#[must_use]
pub fn annotation_key(path: &str, check_folder: bool) -> String {
    let normalized = path.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or(&normalized);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _ext)| stem);
    let key = stem
        .to_lowercase()
        .replace("_polygons", "")
        .replace("_gtfine", "")
        .replace("_gtcoarse", "");
    if check_folder {
        let digits = key.replace('_', "").replace("frame", "");
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            if let Some(parent) = normalized.rsplit('/').nth(1) {
                return format!("{parent}_{key}");
            }
        }
    }
    key
}

/// Canonical form of a category label: the last `--`-separated component
/// (Vistas-style hierarchical names), lowercased, non-alphanumerics
/// dropped. Idempotent, so delta labels may arrive pre-canonicalized.
#[must_use]
pub fn canonical_label(name: &str) -> String {
    let last = name.rsplit("--").next().unwrap_or(name);
    last.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}
