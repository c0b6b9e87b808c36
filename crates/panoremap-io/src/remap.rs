//! The remap job: translate a whole panoptic annotation set onto a target
//! taxonomy, consolidating stuff segments and rewriting id masks.
//!
//! Per image the work is independent, so annotations are processed under
//! a rayon worker pool and the per-worker reports merged afterwards. The
//! id mask is only loaded when some consolidation group actually merged
//! (otherwise the source mask is copied verbatim), and the rewritten
//! document is persisted once, atomically, at the end.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use panoremap_core::consolidate::Consolidation;
use panoremap_core::{
    AnnotationRecord, CategoryMapping, JobReport, PanopticDocument, PolicyDocument,
    apply_relabels, consolidate,
};

use crate::{IoError, document, mask_files};

/// Parameters of one remap job.
#[derive(Debug, Clone)]
pub struct RemapOptions {
    /// Source panoptic annotation document.
    pub input: PathBuf,
    /// Destination for the remapped document.
    pub output: PathBuf,
    /// Unified label policy document.
    pub policy: PathBuf,
    /// Directory of the source id masks; defaults to the input path with
    /// its extension stripped (the COCO panoptic convention).
    pub mask_root: Option<PathBuf>,
    /// Source dataset name within the policy.
    pub source_dataset: String,
    /// Target dataset name within the policy.
    pub target_dataset: String,
    /// Name of the category absorbing unmapped sources.
    pub fallback_name: String,
    /// Skip mask consolidation entirely: only the document is rewritten
    /// and stuff segments are not joined.
    pub skip_masks: bool,
}

/// Resolved mask directories of a job that consolidates masks.
struct MaskDirs {
    source: PathBuf,
    target: PathBuf,
    /// Source and target resolve to the same directory; rewriting in
    /// place without transactional guarantees is refused.
    same: bool,
}

/// Run a remap job.
///
/// # Errors
///
/// Configuration failures (unreadable policy/input, unknown dataset,
/// missing mask root) abort before any mutation. Per-image mask problems
/// are recorded in the returned report instead.
pub fn run_remap(options: &RemapOptions) -> Result<JobReport, IoError> {
    let policy: PolicyDocument = document::load_json(&options.policy)?;
    let mapping = CategoryMapping::from_policy(
        &policy,
        &options.source_dataset,
        &options.target_dataset,
        &options.fallback_name,
    )?;

    let mut doc: PanopticDocument = document::load_json(&options.input)?;

    let masks = if options.skip_masks {
        None
    } else {
        let source = options
            .mask_root
            .clone()
            .unwrap_or_else(|| default_mask_root(&options.input));
        if !source.is_dir() {
            return Err(IoError::MissingMaskRoot(source));
        }
        let target = default_mask_root(&options.output);
        let same = source == target;
        if !same {
            fs::create_dir_all(&target).map_err(|io| IoError::Write {
                path: target.clone(),
                source: io,
            })?;
        }
        Some(MaskDirs {
            source,
            target,
            same,
        })
    };

    let annotations = std::mem::take(&mut doc.annotations);
    log::info!(
        "remapping {} annotations from `{}` onto `{}`",
        annotations.len(),
        options.source_dataset,
        options.target_dataset,
    );
    let results: Vec<(AnnotationRecord, JobReport)> = annotations
        .into_par_iter()
        .map(|record| remap_record(record, &mapping, masks.as_ref()))
        .collect();

    let mut report = JobReport::default();
    doc.annotations = results
        .into_iter()
        .map(|(record, record_report)| {
            report.merge(record_report);
            record
        })
        .collect();
    doc.categories = mapping.target_categories.clone();

    document::save_json_atomic(&options.output, &doc)?;
    Ok(report)
}

/// Default mask directory of a panoptic document: the document path with
/// its extension stripped.
#[must_use]
pub fn default_mask_root(document_path: &Path) -> PathBuf {
    document_path.with_extension("")
}

fn remap_record(
    mut record: AnnotationRecord,
    mapping: &CategoryMapping,
    masks: Option<&MaskDirs>,
) -> (AnnotationRecord, JobReport) {
    let mut report = JobReport::default();
    let key = record.file_name.clone();

    let segments = std::mem::take(&mut record.segments_info);
    let result = consolidate(segments, mapping, masks.is_some());

    if let Some(dirs) = masks {
        sync_mask(dirs, &key, &result, &mut report);
    }

    record.segments_info = result.segments;
    if report.errors.is_empty() {
        report.success_count = 1;
    }
    (record, report)
}

/// Bring the image's mask file at the target location in line with the
/// consolidation result.
fn sync_mask(dirs: &MaskDirs, file_name: &str, result: &Consolidation, report: &mut JobReport) {
    if dirs.same {
        if result.needs_mask_rewrite() {
            log::error!("{file_name}: source and target mask directories are identical");
            report.error(
                file_name,
                None,
                "source and target mask directories are identical; mask consolidation skipped",
            );
        }
        // Without a merge the mask at the shared location is already
        // consistent; nothing to do.
        return;
    }

    let source = dirs.source.join(file_name);
    let target = dirs.target.join(file_name);
    let outcome = if result.needs_mask_rewrite() {
        rewrite_mask(&source, &target, result)
    } else {
        mask_files::copy_mask(&source, &target)
    };
    if let Err(err) = outcome {
        log::error!("{file_name}: {err}");
        report.error(file_name, None, err.to_string());
    }
}

fn rewrite_mask(source: &Path, target: &Path, result: &Consolidation) -> Result<(), IoError> {
    let mut mask = mask_files::load_id_mask(source)?;
    apply_relabels(&mut mask, &result.relabels)?;
    mask_files::save_id_mask(target, &mask)
}
