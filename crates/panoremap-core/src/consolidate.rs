//! Segment consolidation: rewrite one annotation's segment list from the
//! source category space into the target space.
//!
//! Segments whose target category is a known background ("stuff") class
//! are gathered per target category and merged into a single segment; the
//! merge is additionally recorded as a [`MaskRelabel`] plan so the caller
//! can rewrite the image's id mask to match. Segments that change from a
//! known-stuff source to a known-countable target get their crowd flag
//! set, signalling that the single emitted "instance" may stand in for an
//! unlabeled aggregate.
//!
//! This module is pure: it never touches the filesystem. Callers decide
//! whether and when to load a mask, apply the relabel plan with
//! [`apply_relabels`], and persist the result.

use std::collections::HashMap;

use crate::mapping::CategoryMapping;
use crate::mask::IdMask;
use crate::types::{BBox, RemapError, SegmentInfo, VOID_ID};

/// Mask rewrite instruction for one merged segment group: every pixel
/// holding a retired id must be relabeled to the survivor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskRelabel {
    /// Id the merged segment keeps (the maximum id among the group).
    pub survivor: i64,
    /// Ids erased by the merge.
    pub retired: Vec<i64>,
}

/// Result of consolidating one annotation's segment list.
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidation {
    /// Rewritten segments: immediately-emitted ones first (in input
    /// order), then one segment per pending group (in first-appearance
    /// order of the group's target category).
    pub segments: Vec<SegmentInfo>,
    /// Relabel plans, one per multi-member group. Empty when the mask is
    /// already consistent and need not be rewritten.
    pub relabels: Vec<MaskRelabel>,
}

impl Consolidation {
    /// Whether applying this consolidation requires rewriting the mask.
    #[must_use]
    pub fn needs_mask_rewrite(&self) -> bool {
        !self.relabels.is_empty()
    }
}

/// Consolidate `segments` under `mapping`.
///
/// Per segment, the target category is looked up in the mapping table
/// (unmapped sources fall to [`VOID_ID`]). When the target is a known
/// non-countable category **and** `join_stuff` is set, the segment is
/// deferred into a per-target pending group instead of being emitted
/// immediately; a multi-member group collapses into one segment whose id
/// is the maximum member id, whose area is the member sum, and whose bbox
/// is the union rectangle. Merged segments never carry a crowd flag of
/// their own; conversely a known-stuff source emitted as a known-countable
/// target always does.
#[must_use]
pub fn consolidate(
    segments: Vec<SegmentInfo>,
    mapping: &CategoryMapping,
    join_stuff: bool,
) -> Consolidation {
    let mut emitted = Vec::with_capacity(segments.len());
    // Pending groups in first-appearance order of their target category.
    let mut groups: Vec<(i64, Vec<SegmentInfo>)> = Vec::new();
    let mut group_index: HashMap<i64, usize> = HashMap::new();

    for mut seg in segments {
        let target = mapping
            .source_to_target
            .get(&seg.category_id)
            .copied()
            .unwrap_or(VOID_ID);
        let source_countable = mapping.source_countable.get(&seg.category_id).copied();
        let target_countable = mapping.target_countable.get(&target).copied();
        seg.category_id = target;

        if join_stuff && target_countable == Some(false) {
            let slot = *group_index.entry(target).or_insert_with(|| {
                groups.push((target, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(seg);
            continue;
        }
        if source_countable == Some(false) && target_countable == Some(true) {
            seg.iscrowd = true;
        }
        emitted.push(seg);
    }

    let mut relabels = Vec::new();
    for (target, group) in groups {
        if group.len() == 1 {
            emitted.extend(group);
            continue;
        }
        let survivor = group.iter().map(|s| s.id).max().unwrap_or(VOID_ID);
        let area = group.iter().map(|s| s.area).sum();
        let bbox = group
            .iter()
            .filter_map(|s| s.bbox)
            .reduce(BBox::union);
        relabels.push(MaskRelabel {
            survivor,
            retired: group.iter().map(|s| s.id).filter(|&id| id != survivor).collect(),
        });
        emitted.push(SegmentInfo {
            id: survivor,
            category_id: target,
            bbox,
            area,
            iscrowd: false,
            extra: serde_json::Map::new(),
        });
    }

    Consolidation {
        segments: emitted,
        relabels,
    }
}

/// Apply a relabel plan to an id mask: every pixel holding a retired id is
/// rewritten to its group's survivor.
///
/// # Errors
///
/// Returns [`RemapError::IdOutOfRange`] when a plan id does not fit the
/// mask's 24-bit id space (such an id cannot address any pixel, so the
/// plan cannot be what produced this mask).
pub fn apply_relabels(mask: &mut IdMask, relabels: &[MaskRelabel]) -> Result<(), RemapError> {
    let narrow = |id: i64| -> Result<u32, RemapError> {
        u32::try_from(id)
            .ok()
            .filter(|&v| v < 1 << 24)
            .ok_or(RemapError::IdOutOfRange { id, bits: 24 })
    };
    for plan in relabels {
        let survivor = narrow(plan.survivor)?;
        for &retired in &plan.retired {
            mask.relabel(narrow(retired)?, survivor);
        }
    }
    Ok(())
}
