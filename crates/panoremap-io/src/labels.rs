//! Cityscapes-style label-table text format.
//!
//! The table is a Python-syntax list of `Label(...)` tuples with one entry
//! per category and a fixed, human-aligned column layout:
//!
//! ```text
//! labels = [
//!     #       name                     id    trainId   category            catId     hasInstances   ignoreInEval   color
//!     Label(  'unlabeled'            ,  0 ,      255 , 'void'             , 0       , False        , True         , (  0,  0,  0) ),
//! ]
//! ```
//!
//! [`parse_label_table`] and [`write_label_table`] round-trip entries
//! field-for-field, including the boolean flags and colors.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use panoremap_core::Category;

use crate::IoError;

const TABLE_HEADER: &str = "\nlabels = [\n    #       name                     id    trainId   category            catId     hasInstances   ignoreInEval   color\n";

/// Parse a label table into categories.
///
/// Lines without a `Label(` constructor are skipped; the first `]` after
/// at least one entry ends the table.
///
/// # Errors
///
/// [`IoError::LabelTable`] when an entry line does not have the expected
/// field layout.
pub fn parse_label_table(text: &str) -> Result<Vec<Category>, IoError> {
    let mut categories = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if !categories.is_empty() && line.contains(']') {
            break;
        }
        if !line.contains("Label(") {
            continue;
        }
        categories.push(parse_entry(line).map_err(|message| IoError::LabelTable {
            line: index + 1,
            message,
        })?);
    }
    Ok(categories)
}

fn parse_entry(line: &str) -> Result<Category, String> {
    let cleaned = line.replace(['(', ')'], "");
    let parts: Vec<&str> = cleaned.split(',').map(str::trim).collect();
    if parts.len() < 10 {
        return Err(format!(
            "expected 10 comma-separated fields, got {}",
            parts.len()
        ));
    }

    let quoted = |field: &str| -> Result<String, String> {
        field
            .split('\'')
            .nth(1)
            .map(ToOwned::to_owned)
            .ok_or_else(|| format!("expected a quoted name in `{field}`"))
    };
    let int = |field: &str| -> Result<i64, String> {
        field
            .parse::<i64>()
            .map_err(|e| format!("invalid integer `{field}`: {e}"))
    };
    let boolean = |field: &str| -> Result<bool, String> {
        match field {
            "True" => Ok(true),
            "False" => Ok(false),
            other => Err(format!("expected True or False, got `{other}`")),
        }
    };
    let channel = |field: &str| -> Result<u8, String> {
        field
            .parse::<u8>()
            .map_err(|e| format!("invalid color channel `{field}`: {e}"))
    };

    let ignore_in_eval = boolean(parts[6])?;
    Ok(Category {
        name: quoted(parts[0])?,
        id: int(parts[1])?,
        supercategory: Some(quoted(parts[3])?),
        isthing: Some(boolean(parts[5])?),
        color: Some([channel(parts[7])?, channel(parts[8])?, channel(parts[9])?]),
        train_id: Some(int(parts[2])?),
        supercategory_id: Some(int(parts[4])?),
        evaluate: Some(!ignore_in_eval),
        extra: serde_json::Map::new(),
    })
}

/// Render categories as a label table with the fixed column layout.
///
/// Missing optional fields take the conventional defaults: supercategory
/// `void`, supercategory id -1, train id -1, not countable, evaluated,
/// black color.
#[must_use]
pub fn write_label_table(categories: &[Category]) -> String {
    let mut out = String::from(TABLE_HEADER);
    for cat in categories {
        let name = format!("{}'", cat.name);
        let supercategory = format!("{}'", cat.supercategory.as_deref().unwrap_or("void"));
        let [r, g, b] = cat.color.unwrap_or([0, 0, 0]);
        let _ = writeln!(
            out,
            "    Label(  '{name: <22},{id:3} ,      {tid:3} , '{supercategory: <17},{cid:2}       , {instances: <13}, {ignore: <13}, ({r:3},{g:3},{b:3}) ),",
            id = cat.id,
            tid = cat.train_id.unwrap_or(-1),
            cid = cat.supercategory_id.unwrap_or(-1),
            instances = python_bool(cat.isthing.unwrap_or(false)),
            ignore = python_bool(!cat.evaluate.unwrap_or(true)),
        );
    }
    out.push_str("]\n");
    out
}

const fn python_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Load a label table from disk.
///
/// # Errors
///
/// [`IoError::Read`] when the file cannot be read, [`IoError::LabelTable`]
/// when an entry does not parse.
pub fn load_label_table(path: &Path) -> Result<Vec<Category>, IoError> {
    let text = fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_owned(),
        source,
    })?;
    parse_label_table(&text)
}

/// Write a label table to disk (write-new-then-rename).
///
/// # Errors
///
/// [`IoError::Write`] when the file cannot be written into place.
pub fn save_label_table(path: &Path, categories: &[Category]) -> Result<(), IoError> {
    let tmp = crate::document::tmp_sibling(path);
    fs::write(&tmp, write_label_table(categories)).map_err(|source| IoError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| IoError::Write {
        path: path.to_owned(),
        source,
    })
}

/// Load a category list from a COCO/Vistas-style JSON document, which
/// keeps it under either a `categories` or a `labels` key.
///
/// # Errors
///
/// [`IoError::Read`]/[`IoError::Json`] on unreadable or malformed input,
/// including documents with neither key.
pub fn load_categories_json(path: &Path) -> Result<Vec<Category>, IoError> {
    let value: serde_json::Value = crate::document::load_json(path)?;
    let list = value
        .get("categories")
        .or_else(|| value.get("labels"))
        .cloned()
        .ok_or_else(|| IoError::Json {
            path: path.to_owned(),
            source: serde::de::Error::custom("document has neither `categories` nor `labels`"),
        })?;
    serde_json::from_value(list).map_err(|source| IoError::Json {
        path: path.to_owned(),
        source,
    })
}

/// Assign dense supercategory ids in first-appearance order to categories
/// loaded from documents that do not carry them.
pub fn assign_supercategory_ids(categories: &mut [Category]) {
    let mut next = 0;
    let mut seen: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for cat in categories {
        let name = cat.supercategory.clone().unwrap_or_default();
        let id = *seen.entry(name).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
        cat.supercategory_id = Some(id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_categories() -> Vec<Category> {
        vec![
            Category {
                name: "unlabeled".to_owned(),
                id: 0,
                supercategory: Some("void".to_owned()),
                isthing: Some(false),
                color: Some([0, 0, 0]),
                train_id: Some(255),
                supercategory_id: Some(0),
                evaluate: Some(false),
                extra: serde_json::Map::new(),
            },
            Category {
                name: "car".to_owned(),
                id: 26,
                supercategory: Some("vehicle".to_owned()),
                isthing: Some(true),
                color: Some([0, 0, 142]),
                train_id: Some(13),
                supercategory_id: Some(7),
                evaluate: Some(true),
                extra: serde_json::Map::new(),
            },
        ]
    }

    #[test]
    fn round_trip_is_field_for_field_identical() {
        let categories = sample_categories();
        let text = write_label_table(&categories);
        let parsed = parse_label_table(&text).unwrap();
        assert_eq!(parsed, categories);
    }

    #[test]
    fn writer_emits_fixed_width_columns() {
        let text = write_label_table(&sample_categories());
        assert!(text.starts_with("\nlabels = ["));
        assert!(text.ends_with("]\n"));
        assert!(text.contains(
            "    Label(  'unlabeled'            ,  0 ,      255 , 'void'            , 0       , False        , True         , (  0,  0,  0) ),"
        ));
        assert!(text.contains(
            "    Label(  'car'                  , 26 ,       13 , 'vehicle'         , 7       , True         , False        , (  0,  0,142) ),"
        ));
    }

    #[test]
    fn parse_reads_cityscapes_style_entries() {
        let text = "\nlabels = [\n    Label(  'road'                 ,  7 ,        0 , 'flat'            , 1       , False        , False        , (128, 64,128) ),\n]\n";
        let parsed = parse_label_table(text).unwrap();
        assert_eq!(parsed.len(), 1);
        let road = &parsed[0];
        assert_eq!(road.name, "road");
        assert_eq!(road.id, 7);
        assert_eq!(road.train_id, Some(0));
        assert_eq!(road.supercategory.as_deref(), Some("flat"));
        assert_eq!(road.supercategory_id, Some(1));
        assert_eq!(road.isthing, Some(false));
        assert_eq!(road.evaluate, Some(true));
        assert_eq!(road.color, Some([128, 64, 128]));
    }

    #[test]
    fn parse_stops_at_closing_bracket() {
        let text = "labels = [\n    Label(  'road'                 ,  7 ,        0 , 'flat'            , 1       , False        , False        , (128, 64,128) ),\n]\ntrailing = Label( garbage\n";
        let parsed = parse_label_table(text).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn parse_skips_comment_and_blank_lines() {
        let text = "# comment\n\nlabels = [\n    # header comment\n]\n";
        // No Label( entries at all -> empty table, no error.
        assert!(parse_label_table(text).unwrap().is_empty());
    }

    #[test]
    fn malformed_entry_reports_line_number() {
        let text = "labels = [\n    Label( 'broken' ),\n]\n";
        let err = parse_label_table(text).unwrap_err();
        assert!(matches!(err, IoError::LabelTable { line: 2, .. }));
    }

    #[test]
    fn defaults_applied_for_sparse_categories() {
        let sparse: Category = serde_json::from_str(r#"{"name": "sky", "id": 3}"#).unwrap();
        let text = write_label_table(&[sparse]);
        let parsed = parse_label_table(&text).unwrap();
        assert_eq!(parsed[0].supercategory.as_deref(), Some("void"));
        assert_eq!(parsed[0].train_id, Some(-1));
        assert_eq!(parsed[0].isthing, Some(false));
        assert_eq!(parsed[0].evaluate, Some(true));
        assert_eq!(parsed[0].color, Some([0, 0, 0]));
    }

    #[test]
    fn categories_loaded_from_either_json_key() {
        let dir = std::env::temp_dir().join(format!("panoremap-labels-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let with_categories = dir.join("cats.json");
        fs::write(
            &with_categories,
            r#"{"categories": [{"name": "sky", "id": 1}]}"#,
        )
        .unwrap();
        assert_eq!(load_categories_json(&with_categories).unwrap()[0].name, "sky");

        let with_labels = dir.join("labels.json");
        fs::write(&with_labels, r#"{"labels": [{"name": "car", "id": 2}]}"#).unwrap();
        assert_eq!(load_categories_json(&with_labels).unwrap()[0].name, "car");

        let with_neither = dir.join("none.json");
        fs::write(&with_neither, r#"{"images": []}"#).unwrap();
        assert!(matches!(
            load_categories_json(&with_neither).unwrap_err(),
            IoError::Json { .. }
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn supercategory_ids_assigned_in_first_appearance_order() {
        let mut cats: Vec<Category> = serde_json::from_str(
            r#"[
                {"name": "road", "id": 1, "supercategory": "flat"},
                {"name": "sky", "id": 2, "supercategory": "nature"},
                {"name": "sidewalk", "id": 3, "supercategory": "flat"}
            ]"#,
        )
        .unwrap();
        assign_supercategory_ids(&mut cats);
        assert_eq!(cats[0].supercategory_id, Some(0));
        assert_eq!(cats[1].supercategory_id, Some(1));
        assert_eq!(cats[2].supercategory_id, Some(0));
    }
}
