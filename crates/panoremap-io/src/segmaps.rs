//! The segmentation-map export job: derive per-image semantic (8-bit) and
//! instance (16-bit) label PNGs from a panoptic document and its id masks.
//!
//! Output files are named after the source image: `<stem>_labelIds.png`
//! and `<stem>_instanceIds.png`. Images are processed independently under
//! a rayon worker pool.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use panoremap_core::{
    AnnotationRecord, ImageEntry, ImageId, JobReport, PanopticDocument, countable_index,
    mask::{instance_map, semantic_map},
};

use crate::{IoError, document, mask_files, remap};

/// Parameters of one export job.
#[derive(Debug, Clone)]
pub struct SegmapOptions {
    /// Panoptic annotation document.
    pub json_path: PathBuf,
    /// Destination directory for semantic label maps; `None` skips them.
    pub semantic_dir: Option<PathBuf>,
    /// Destination directory for instance label maps; `None` skips them.
    pub instance_dir: Option<PathBuf>,
    /// Directory of the id masks; defaults to the document path with its
    /// extension stripped.
    pub mask_dir: Option<PathBuf>,
}

/// Run an export job.
///
/// # Errors
///
/// [`IoError::NothingToExport`] when neither output directory is set; an
/// unreadable document or uncreatable output directory is fatal. Missing
/// image entries are warnings, per-image mask problems are errors in the
/// returned report.
pub fn run_segmaps(options: &SegmapOptions) -> Result<JobReport, IoError> {
    if options.semantic_dir.is_none() && options.instance_dir.is_none() {
        return Err(IoError::NothingToExport);
    }
    let doc: PanopticDocument = document::load_json(&options.json_path)?;
    let mask_dir = options
        .mask_dir
        .clone()
        .unwrap_or_else(|| remap::default_mask_root(&options.json_path));

    for dir in [&options.semantic_dir, &options.instance_dir]
        .into_iter()
        .flatten()
    {
        fs::create_dir_all(dir).map_err(|source| IoError::Write {
            path: dir.clone(),
            source,
        })?;
    }

    let images: HashMap<&ImageId, &ImageEntry> =
        doc.images.iter().map(|entry| (&entry.id, entry)).collect();
    let countable = countable_index(&doc.categories);

    let report = doc
        .annotations
        .par_iter()
        .map(|record| export_record(record, &images, &countable, &mask_dir, options))
        .reduce(JobReport::default, |mut merged, worker| {
            merged.merge(worker);
            merged
        });
    Ok(report)
}

fn export_record(
    record: &AnnotationRecord,
    images: &HashMap<&ImageId, &ImageEntry>,
    countable: &HashMap<i64, bool>,
    mask_dir: &Path,
    options: &SegmapOptions,
) -> JobReport {
    let mut report = JobReport::default();
    let key = record.file_name.clone();
    let Some(image) = images.get(&record.image_id) else {
        log::warn!("{key}: image_id not found in images list");
        report.warning(key, "image_id not found in images list");
        return report;
    };

    let result = (|| -> Result<(), IoError> {
        let mask = mask_files::load_id_mask(&mask_dir.join(&record.file_name))?;
        let stem = file_stem(&image.file_name);
        if let Some(dir) = &options.semantic_dir {
            let semantic = semantic_map(&mask, &record.segments_info)?;
            mask_files::save_gray8(
                &dir.join(format!("{stem}_labelIds.png")),
                mask.width(),
                mask.height(),
                semantic,
            )?;
        }
        if let Some(dir) = &options.instance_dir {
            let instances = instance_map(&mask, &record.segments_info, countable)?;
            mask_files::save_gray16(
                &dir.join(format!("{stem}_instanceIds.png")),
                mask.width(),
                mask.height(),
                instances,
            )?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => report.success_count = 1,
        Err(err) => {
            log::error!("{key}: {err}");
            report.error(&key, None, err.to_string());
        }
    }
    report
}

/// File name without its final extension.
fn file_stem(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _ext)| stem)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use panoremap_core::IdMask;

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("panoremap-segmap-{tag}-{}", std::process::id()));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_store(dir: &Path) -> PathBuf {
        let path = dir.join("panoptic.json");
        fs::write(
            &path,
            r#"{
                "images": [{"id": 1, "file_name": "a.jpg"}],
                "categories": [
                    {"name": "sky", "id": 2, "isthing": false},
                    {"name": "car", "id": 5, "isthing": true}
                ],
                "annotations": [{
                    "image_id": 1,
                    "file_name": "a.png",
                    "segments_info": [
                        {"id": 10, "category_id": 2, "bbox": [0, 0, 2, 1], "area": 2, "iscrowd": 0},
                        {"id": 20, "category_id": 5, "bbox": [2, 0, 2, 1], "area": 2, "iscrowd": 0}
                    ]
                }]
            }"#,
        )
        .unwrap();
        let mask_dir = dir.join("panoptic");
        fs::create_dir_all(&mask_dir).unwrap();
        let mask = IdMask::from_raw(4, 1, vec![10, 10, 20, 20]).unwrap();
        mask_files::save_id_mask(&mask_dir.join("a.png"), &mask).unwrap();
        path
    }

    #[test]
    fn exports_semantic_and_instance_maps() {
        let dir = scratch_dir("export");
        let json_path = write_store(&dir);
        let report = run_segmaps(&SegmapOptions {
            json_path,
            semantic_dir: Some(dir.join("sem")),
            instance_dir: Some(dir.join("inst")),
            mask_dir: None,
        })
        .unwrap();
        assert_eq!(report.success_count, 1);
        assert!(report.is_clean());

        let semantic = image::open(dir.join("sem").join("a_labelIds.png"))
            .unwrap()
            .to_luma8();
        assert_eq!(semantic.as_raw(), &vec![2, 2, 5, 5]);

        let instances = image::open(dir.join("inst").join("a_instanceIds.png"))
            .unwrap()
            .to_luma16();
        // Stuff keeps its category id; the first countable segment is
        // numbered category*1000 + 1.
        assert_eq!(instances.as_raw(), &vec![2, 2, 5001, 5001]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn no_output_selected_is_an_error() {
        let dir = scratch_dir("nooutput");
        let json_path = write_store(&dir);
        let err = run_segmaps(&SegmapOptions {
            json_path,
            semantic_dir: None,
            instance_dir: None,
            mask_dir: None,
        })
        .unwrap_err();
        assert!(matches!(err, IoError::NothingToExport));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn annotation_without_image_entry_is_a_warning() {
        let dir = scratch_dir("noimage");
        let json_path = dir.join("panoptic.json");
        fs::write(
            &json_path,
            r#"{
                "images": [],
                "categories": [],
                "annotations": [{"image_id": 1, "file_name": "a.png", "segments_info": []}]
            }"#,
        )
        .unwrap();
        fs::create_dir_all(dir.join("panoptic")).unwrap();
        let report = run_segmaps(&SegmapOptions {
            json_path,
            semantic_dir: Some(dir.join("sem")),
            instance_dir: None,
            mask_dir: None,
        })
        .unwrap();
        assert_eq!(report.success_count, 0);
        assert_eq!(report.warnings.len(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_mask_file_is_a_per_image_error() {
        let dir = scratch_dir("nomask");
        let json_path = write_store(&dir);
        fs::remove_file(dir.join("panoptic").join("a.png")).unwrap();
        let report = run_segmaps(&SegmapOptions {
            json_path,
            semantic_dir: Some(dir.join("sem")),
            instance_dir: None,
            mask_dir: None,
        })
        .unwrap();
        assert_eq!(report.success_count, 0);
        assert_eq!(report.errors.len(), 1);
        fs::remove_dir_all(&dir).ok();
    }
}
