//! Integration test: remap a small panoptic set onto a target taxonomy,
//! then apply a delta correction batch to the remapped result.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::PathBuf;

use panoremap_core::{IdMask, PanopticDocument};
use panoremap_io::{DeltaOptions, RemapOptions, document, mask_files, run_delta, run_remap};

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("panoremap-e2e-{}", std::process::id()));
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn remap_then_patch_round_trip() {
    let dir = scratch_dir();

    // A two-image set: image a has two gravel patches and a car, image b
    // a single sky segment.
    let input = dir.join("panoptic.json");
    fs::write(
        &input,
        r#"{
            "images": [
                {"id": 1, "file_name": "a.jpg"},
                {"id": 2, "file_name": "b.jpg"}
            ],
            "categories": [],
            "annotations": [
                {
                    "image_id": 1,
                    "file_name": "a.png",
                    "segments_info": [
                        {"id": 5, "category_id": 1, "bbox": [0, 0, 10, 10], "area": 50, "iscrowd": 0},
                        {"id": 9, "category_id": 1, "bbox": [5, 5, 10, 10], "area": 30, "iscrowd": 0},
                        {"id": 2, "category_id": 3, "bbox": [0, 10, 4, 4], "area": 16, "iscrowd": 0}
                    ]
                },
                {
                    "image_id": 2,
                    "file_name": "b.png",
                    "segments_info": [
                        {"id": 4, "category_id": 2, "bbox": [0, 0, 8, 8], "area": 64, "iscrowd": 0}
                    ]
                }
            ]
        }"#,
    )
    .unwrap();

    let mask_dir = dir.join("panoptic");
    fs::create_dir_all(&mask_dir).unwrap();
    let mask_a = IdMask::from_raw(4, 2, vec![5, 5, 9, 9, 2, 2, 2, 2]).unwrap();
    mask_files::save_id_mask(&mask_dir.join("a.png"), &mask_a).unwrap();
    let mask_b = IdMask::from_raw(2, 2, vec![4, 4, 4, 4]).unwrap();
    mask_files::save_id_mask(&mask_dir.join("b.png"), &mask_b).unwrap();

    let policy = dir.join("policy.json");
    fs::write(
        &policy,
        r#"{
            "mapping": [
                {"wd2_name": "unlabeled", "eval_name": "void"},
                {"wd2_name": "gravel", "eval_name": "ground"},
                {"wd2_name": "sky", "eval_name": "sky"},
                {"wd2_name": "car", "eval_name": "car"}
            ],
            "per_ds": {
                "wd2": [
                    {"name": "unlabeled", "id": 0, "instances": false},
                    {"name": "gravel", "id": 1, "instances": false},
                    {"name": "sky", "id": 2, "instances": false},
                    {"name": "car", "id": 3, "instances": true}
                ],
                "eval": [
                    {"name": "void", "id": 0, "isthing": false},
                    {"name": "ground", "id": 7, "isthing": false},
                    {"name": "sky", "id": 11, "isthing": false},
                    {"name": "car", "id": 12, "isthing": true}
                ]
            }
        }"#,
    )
    .unwrap();

    // --- Stage 1: remap onto the eval taxonomy ---

    let output = dir.join("remapped.json");
    let report = run_remap(&RemapOptions {
        input,
        output: output.clone(),
        policy,
        mask_root: None,
        source_dataset: "wd2".to_owned(),
        target_dataset: "eval".to_owned(),
        fallback_name: "unlabeled".to_owned(),
        skip_masks: false,
    })
    .expect("remap job should succeed");
    assert_eq!(report.success_count, 2);
    assert!(report.is_clean(), "unexpected report entries: {report:?}");

    let doc: PanopticDocument = document::load_json(&output).unwrap();
    let image_a = &doc.annotations[0].segments_info;
    // Car emitted first, the two gravel patches merged behind it.
    assert_eq!(image_a.len(), 2);
    assert_eq!(image_a[0].id, 2);
    assert_eq!(image_a[0].category_id, 12);
    let merged = &image_a[1];
    assert_eq!(merged.id, 9);
    assert_eq!(merged.category_id, 7);
    assert_eq!(merged.area, 80);
    assert_eq!(merged.bbox.map(<[i64; 4]>::from), Some([0, 0, 15, 15]));

    // Image a's mask was rewritten, image b's copied verbatim.
    let mask_a = mask_files::load_id_mask(&dir.join("remapped").join("a.png")).unwrap();
    assert_eq!(mask_a.pixels(), &[9, 9, 9, 9, 2, 2, 2, 2]);
    let mask_b = mask_files::load_id_mask(&dir.join("remapped").join("b.png")).unwrap();
    assert_eq!(mask_b.pixels(), &[4, 4, 4, 4]);

    // --- Stage 2: correct image b's sky to ground via a delta batch ---

    let delta = dir.join("delta.json");
    fs::write(
        &delta,
        r#"{
            "categories": [],
            "annotations": [
                {
                    "image_id": "2",
                    "segments_info": [
                        {"id": 4, "old": "sky", "new": "ground", "bbox": [0, 0, 8, 8]}
                    ]
                },
                {
                    "image_id": "999",
                    "segments_info": [
                        {"id": 1, "old": "sky", "new": "ground", "bbox": [0, 0, 1, 1]}
                    ]
                }
            ]
        }"#,
    )
    .unwrap();

    let report = run_delta(&DeltaOptions {
        change_path: output.clone(),
        delta_path: delta,
        tolerance: 1,
    })
    .expect("delta job should succeed");
    assert_eq!(report.success_count, 1);
    assert!(report.errors.is_empty());
    // The dangling record for image 999 is a warning, not an error.
    assert_eq!(report.warnings.len(), 1);

    let patched: PanopticDocument = document::load_json(&output).unwrap();
    assert_eq!(patched.annotations[1].segments_info[0].category_id, 7);

    fs::remove_dir_all(&dir).ok();
}
