//! The delta job: apply a correction batch to an existing annotation
//! store.
//!
//! The store dialect is resolved once, up front: a directory is a
//! Cityscapes-style tree of per-image polygon files (patched and
//! persisted individually), a file is a consolidated COCO-panoptic
//! document (patched in memory, persisted once at the end, with the
//! batch's new categories appended under freshly assigned ids). Delta
//! records that match no stored image are warnings, not errors.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use panoremap_core::{
    CategoryRef, DeltaDocument, DeltaSegment, JobReport, PanopticDocument, PatchTarget,
    PolygonFile, annotation_key, canonical_label, patch_segments,
};

use crate::{IoError, document};

/// Parameters of one delta job.
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// The store to change: a consolidated panoptic JSON file, or a
    /// directory of per-image polygon JSON files.
    pub change_path: PathBuf,
    /// The delta correction batch.
    pub delta_path: PathBuf,
    /// Cross-validation tolerance in pixels; negative disables the
    /// geometry and category checks.
    pub tolerance: i64,
}

/// Run a delta job.
///
/// # Errors
///
/// Unreadable delta or store documents are fatal; everything else
/// accumulates in the returned report.
pub fn run_delta(options: &DeltaOptions) -> Result<JobReport, IoError> {
    let delta: DeltaDocument = document::load_json(&options.delta_path)?;
    log::info!(
        "applying {} delta records to {}",
        delta.annotations.len(),
        options.change_path.display(),
    );
    if options.change_path.is_dir() {
        patch_polygon_store(&options.change_path, &delta, options.tolerance)
    } else {
        patch_panoptic_store(&options.change_path, delta, options.tolerance)
    }
}

/// Patch a directory of per-image polygon files. Each modified file is
/// persisted individually, atomically, as it is processed.
fn patch_polygon_store(
    root: &Path,
    delta: &DeltaDocument,
    tolerance: i64,
) -> Result<JobReport, IoError> {
    let mut files = Vec::new();
    collect_json_files(root, &mut files)?;
    let index: HashMap<String, &Path> = files
        .iter()
        .map(|path| {
            (
                annotation_key(&path.to_string_lossy(), true),
                path.as_path(),
            )
        })
        .collect();

    let report = delta
        .annotations
        .par_iter()
        .map(|record| {
            let mut report = JobReport::default();
            let key = annotation_key(&record.image_id.to_string(), false);
            let Some(path) = index.get(&key) else {
                log::warn!("{key}: image_id not found in store");
                report.warning(key, "image_id not found in store");
                return report;
            };
            match patch_polygon_file(path, &record.segments_info, tolerance) {
                Ok(outcome) => {
                    report.success_count = outcome.success_count;
                    for error in outcome.errors {
                        log::warn!("{key}: segment {}: {}", error.id, error.reason);
                        report.error(&key, Some(error.id), error.reason.to_string());
                    }
                }
                Err(err) => {
                    log::error!("{key}: {err}");
                    report.error(&key, None, err.to_string());
                }
            }
            report
        })
        .reduce(JobReport::default, |mut merged, worker| {
            merged.merge(worker);
            merged
        });
    Ok(report)
}

fn patch_polygon_file(
    path: &Path,
    deltas: &[DeltaSegment],
    tolerance: i64,
) -> Result<panoremap_core::PatchOutcome, IoError> {
    let mut file: PolygonFile = document::load_json(path)?;
    let outcome = patch_segments(PatchTarget::Polygons(&mut file.objects), deltas, tolerance);
    document::save_json_atomic(path, &file)?;
    Ok(outcome)
}

/// Patch a consolidated panoptic document in memory and persist it once.
fn patch_panoptic_store(
    path: &Path,
    delta: DeltaDocument,
    tolerance: i64,
) -> Result<JobReport, IoError> {
    let mut doc: PanopticDocument = document::load_json(path)?;
    append_categories(&mut doc, delta.categories);

    let label_index: HashMap<String, i64> = doc
        .categories
        .iter()
        .map(|cat| (canonical_label(&cat.name), cat.id))
        .collect();
    let record_index: HashMap<String, usize> = doc
        .annotations
        .iter()
        .enumerate()
        .map(|(slot, record)| (annotation_key(&record.image_id.to_string(), false), slot))
        .collect();

    // Resolve labels to ids and group the changes per target annotation,
    // so the patch pass itself can run in parallel over the records.
    let mut report = JobReport::default();
    let mut tasks: HashMap<usize, (String, Vec<DeltaSegment>)> = HashMap::new();
    for record in &delta.annotations {
        let key = annotation_key(&record.image_id.to_string(), false);
        let Some(&slot) = record_index.get(&key) else {
            log::warn!("{key}: image_id not found in store");
            report.warning(key, "image_id not found in store");
            continue;
        };
        let (_, changes) = tasks
            .entry(slot)
            .or_insert_with(|| (key.clone(), Vec::new()));
        for segment in &record.segments_info {
            match resolve_segment(segment, &label_index) {
                Ok(resolved) => changes.push(resolved),
                Err(label) => {
                    log::warn!("{key}: unknown category label `{label}`");
                    report.error(&key, Some(segment.id), format!("unknown category label `{label}`"));
                }
            }
        }
    }

    let patched: Vec<JobReport> = doc
        .annotations
        .par_iter_mut()
        .enumerate()
        .map(|(slot, record)| {
            let mut report = JobReport::default();
            if let Some((key, changes)) = tasks.get(&slot) {
                let outcome = patch_segments(
                    PatchTarget::Panoptic(&mut record.segments_info),
                    changes,
                    tolerance,
                );
                report.success_count = outcome.success_count;
                for error in outcome.errors {
                    log::warn!("{key}: segment {}: {}", error.id, error.reason);
                    report.error(key, Some(error.id), error.reason.to_string());
                }
            }
            report
        })
        .collect();
    for worker in patched {
        report.merge(worker);
    }

    document::save_json_atomic(path, &doc)?;
    Ok(report)
}

/// Append the batch's new categories with fresh ids above both the
/// current maximum id and the table length.
fn append_categories(doc: &mut PanopticDocument, new_categories: Vec<panoremap_core::Category>) {
    let max_id = doc.categories.iter().map(|c| c.id).max().unwrap_or(0);
    let mut next_id = (max_id + 1).max(i64::try_from(doc.categories.len()).unwrap_or(i64::MAX));
    for mut category in new_categories {
        category.id = next_id;
        doc.categories.push(category);
        next_id += 1;
    }
}

/// Resolve a delta change's label references to category ids; id
/// references pass through. Labels are canonicalized before lookup
/// (idempotent for pre-canonicalized batches).
fn resolve_segment(
    segment: &DeltaSegment,
    label_index: &HashMap<String, i64>,
) -> Result<DeltaSegment, String> {
    let resolve = |reference: &CategoryRef| -> Result<CategoryRef, String> {
        match reference {
            CategoryRef::Id(id) => Ok(CategoryRef::Id(*id)),
            CategoryRef::Label(label) => label_index
                .get(&canonical_label(label))
                .map(|&id| CategoryRef::Id(id))
                .ok_or_else(|| label.clone()),
        }
    };
    Ok(DeltaSegment {
        id: segment.id,
        old: resolve(&segment.old)?,
        new: resolve(&segment.new)?,
        bbox: segment.bbox,
        bbox_vis: segment.bbox_vis,
        is_crowd: segment.is_crowd,
    })
}

/// Recursively collect `.json` files below `root`.
fn collect_json_files(root: &Path, found: &mut Vec<PathBuf>) -> Result<(), IoError> {
    let entries = fs::read_dir(root).map_err(|source| IoError::Read {
        path: root.to_owned(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| IoError::Read {
            path: root.to_owned(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_json_files(&path, found)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            found.push(path);
        }
    }
    found.sort();
    Ok(())
}
