//! Shared types for the panoremap engines.
//!
//! These mirror the JSON documents the tools exchange: panoptic annotation
//! sets, category tables, unified mapping policies, and delta correction
//! batches. Wire-format quirks (0/1 booleans, `isthing` vs `instances`,
//! numeric vs string image ids) are absorbed here once so the engines
//! operate on plain Rust values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category id assigned to segments whose source category has no mapping
/// entry. Matches the permanently-ignored void convention of negative ids.
pub const VOID_ID: i64 = -1;

/// Serde support for COCO-style crowd flags, which are `0`/`1` integers
/// on the wire rather than JSON booleans.
pub(crate) mod bool_as_int {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(serde::de::Error::custom(format!(
                "crowd flag must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Axis-aligned integer box in pixel coordinates, `[x, y, w, h]` on the
/// wire (COCO convention: top-left corner plus extent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct BBox {
    /// Left edge.
    pub x: i64,
    /// Top edge.
    pub y: i64,
    /// Width.
    pub w: i64,
    /// Height.
    pub h: i64,
}

impl BBox {
    /// Create a new box.
    #[must_use]
    pub const fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge (`x + w`).
    #[must_use]
    pub const fn right(self) -> i64 {
        self.x + self.w
    }

    /// Bottom edge (`y + h`).
    #[must_use]
    pub const fn bottom(self) -> i64 {
        self.y + self.h
    }

    /// Smallest box enclosing both `self` and `other` (componentwise min
    /// of the top-left corner, max of the bottom-right corner).
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }
}

impl From<[i64; 4]> for BBox {
    fn from([x, y, w, h]: [i64; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<BBox> for [i64; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.w, b.h]
    }
}

/// One category of an annotation taxonomy.
///
/// Only `name` and `id` are universally present. The countable-instance
/// ("thing") flag appears as `isthing` in COCO panoptic documents and as
/// `instances` in Vistas/WildDash policy lists; both deserialize into
/// [`Category::isthing`]. Unknown fields round-trip through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Human-readable category name; unique within one taxonomy.
    pub name: String,
    /// Numeric category id; identity within one taxonomy. Negative ids
    /// denote permanently-ignored void classes.
    pub id: i64,
    /// Parent group name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
    /// Countable-instance flag; `None` when the document does not state it.
    #[serde(default, alias = "instances", skip_serializing_if = "Option::is_none")]
    pub isthing: Option<bool>,
    /// Display color as `[r, g, b]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 3]>,
    /// Training id for label-map export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_id: Option<i64>,
    /// Dense numeric id of the supercategory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory_id: Option<i64>,
    /// Whether the category participates in evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluate: Option<bool>,
    /// Fields this tool does not interpret, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Category {
    /// Training id with the unmapped default applied: 255 (ignore) for
    /// regular categories, -1 for void classes (negative `id`).
    #[must_use]
    pub fn train_id_or_default(&self) -> i64 {
        self.train_id.unwrap_or(if self.id >= 0 { 255 } else { -1 })
    }
}

/// Image identity as found in panoptic and delta documents: numeric in
/// COCO exports, a string (often a path fragment) elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageId {
    /// Numeric id.
    Number(i64),
    /// String id.
    Name(String),
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(s) => f.write_str(s),
        }
    }
}

/// One segment of a panoptic annotation: a contiguous (possibly
/// multi-component) pixel region of the image's id mask.
///
/// Invariants: `bbox` bounds the region; `area` equals its pixel count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment id, unique within one image's annotation, and the value
    /// its pixels carry in the id mask.
    pub id: i64,
    /// Category id in the taxonomy of the owning document.
    pub category_id: i64,
    /// Bounding box of the region; absent in some partial records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    /// Pixel count of the region.
    #[serde(default)]
    pub area: i64,
    /// Crowd flag: the segment stands in for an uncounted aggregate of
    /// instances. `0`/`1` on the wire.
    #[serde(default, with = "bool_as_int")]
    pub iscrowd: bool,
    /// Fields this tool does not interpret, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One per-image annotation record of a panoptic document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Identity of the annotated image.
    pub image_id: ImageId,
    /// Id-mask file name, relative to the mask root.
    pub file_name: String,
    /// Segments of this image, in document order.
    pub segments_info: Vec<SegmentInfo>,
    /// Fields this tool does not interpret, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Entry of the `images` list of a panoptic document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Image identity, referenced by [`AnnotationRecord::image_id`].
    pub id: ImageId,
    /// Source image file name.
    pub file_name: String,
    /// Fields this tool does not interpret, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A COCO-panoptic-style annotation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanopticDocument {
    /// Annotated images.
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    /// Category taxonomy of the document.
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Per-image annotation records.
    pub annotations: Vec<AnnotationRecord>,
    /// Fields this tool does not interpret, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A Cityscapes-style polygon object: label plus vertex list, no
/// precomputed bbox. Positionally indexed within its file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonObject {
    /// Raw label string.
    pub label: String,
    /// Polygon vertices as `[x, y]` pairs.
    #[serde(default)]
    pub polygon: Vec<[f64; 2]>,
    /// Crowd flag, when the dialect defines one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_crowd: Option<bool>,
    /// Fields this tool does not interpret, preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A per-image polygon annotation file (`{"objects": [...]}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonFile {
    /// Polygon objects in file order.
    pub objects: Vec<PolygonObject>,
    /// Fields this tool does not interpret (image dimensions etc.),
    /// preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Category reference inside a delta change: already-resolved numeric id
/// or a raw label, depending on the store dialect the batch targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    /// Resolved category id.
    Id(i64),
    /// Raw label string.
    Label(String),
}

impl fmt::Display for CategoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// One correction inside a delta record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaSegment {
    /// Target segment id (or list position for positionally-indexed
    /// stores).
    pub id: i64,
    /// Category the segment had when the correction was recorded.
    pub old: CategoryRef,
    /// Category the correction assigns.
    pub new: CategoryRef,
    /// Geometry of the segment when the correction was recorded.
    pub bbox: BBox,
    /// Geometry as rendered after occlusion, when available; consulted as
    /// a fallback during cross-validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_vis: Option<BBox>,
    /// Crowd flag carried by the correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_crowd: Option<bool>,
}

/// One per-image record of a delta batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    /// Identity of the targeted image; matched against the store via
    /// [`annotation_key`](crate::delta::annotation_key).
    pub image_id: ImageId,
    /// Corrections for this image.
    pub segments_info: Vec<DeltaSegment>,
}

/// A delta correction batch: per-image records plus categories the batch
/// introduces into the target taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaDocument {
    /// Newly introduced categories, appended to the target table with
    /// freshly assigned ids.
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Per-image correction records.
    pub annotations: Vec<DeltaRecord>,
}

/// Errors of the pure engines. Configuration-level variants abort a job
/// before any mutation.
#[derive(Debug, thiserror::Error)]
pub enum RemapError {
    /// The policy document lacks a required top-level section.
    #[error("policy document is missing the `{0}` section")]
    PolicyStructure(&'static str),

    /// A requested dataset is not described by the policy.
    #[error("dataset `{name}` not present in policy (available: {available:?})")]
    UnknownDataset {
        /// The dataset that was requested.
        name: String,
        /// Dataset names the policy does define.
        available: Vec<String>,
    },

    /// A mapping entry does not name a category of the source dataset.
    #[error("mapping entry {index} has no `{dataset}_name` field")]
    MissingSourceName {
        /// Zero-based index of the entry in the policy's mapping list.
        index: usize,
        /// The source dataset whose key was expected.
        dataset: String,
    },

    /// A mapping entry references a category name the dataset does not
    /// define.
    #[error("category `{name}` not found in dataset `{dataset}`")]
    UnknownCategory {
        /// Dataset whose index was consulted.
        dataset: String,
        /// The unresolvable category name.
        name: String,
    },

    /// An id does not fit the fixed-width encoding of an output format.
    #[error("id {id} exceeds the {bits}-bit range of the output format")]
    IdOutOfRange {
        /// The offending id.
        id: i64,
        /// Bit width of the output format.
        bits: u32,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- BBox ---

    #[test]
    fn bbox_edges() {
        let b = BBox::new(2, 3, 10, 20);
        assert_eq!(b.right(), 12);
        assert_eq!(b.bottom(), 23);
    }

    #[test]
    fn bbox_union_covers_both() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(5, 5, 10, 10);
        assert_eq!(a.union(b), BBox::new(0, 0, 15, 15));
    }

    #[test]
    fn bbox_union_is_commutative() {
        let a = BBox::new(-3, 2, 4, 4);
        let b = BBox::new(1, -1, 2, 2);
        assert_eq!(a.union(b), b.union(a));
    }

    #[test]
    fn bbox_serializes_as_array() {
        let b = BBox::new(1, 2, 3, 4);
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "[1,2,3,4]");
        let back: BBox = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    // --- SegmentInfo wire format ---

    #[test]
    fn segment_deserializes_coco_wire_format() {
        let json = r#"{"id": 42, "category_id": 7, "bbox": [0, 1, 2, 3], "area": 6, "iscrowd": 1}"#;
        let seg: SegmentInfo = serde_json::from_str(json).unwrap();
        assert_eq!(seg.id, 42);
        assert_eq!(seg.category_id, 7);
        assert_eq!(seg.bbox, Some(BBox::new(0, 1, 2, 3)));
        assert_eq!(seg.area, 6);
        assert!(seg.iscrowd);
    }

    #[test]
    fn segment_crowd_flag_round_trips_as_int() {
        let seg = SegmentInfo {
            id: 1,
            category_id: 2,
            bbox: None,
            area: 0,
            iscrowd: true,
            extra: serde_json::Map::new(),
        };
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains("\"iscrowd\":1"));
        let back: SegmentInfo = serde_json::from_str(&json).unwrap();
        assert!(back.iscrowd);
    }

    #[test]
    fn segment_rejects_out_of_range_crowd_flag() {
        let json = r#"{"id": 1, "category_id": 2, "iscrowd": 3}"#;
        let result: Result<SegmentInfo, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn segment_preserves_unknown_fields() {
        let json = r#"{"id": 1, "category_id": 2, "confidence": 0.9}"#;
        let seg: SegmentInfo = serde_json::from_str(json).unwrap();
        assert!(seg.extra.contains_key("confidence"));
        let back = serde_json::to_string(&seg).unwrap();
        assert!(back.contains("confidence"));
    }

    // --- Category ---

    #[test]
    fn category_accepts_instances_alias() {
        let json = r#"{"name": "car", "id": 3, "instances": true}"#;
        let cat: Category = serde_json::from_str(json).unwrap();
        assert_eq!(cat.isthing, Some(true));
    }

    #[test]
    fn category_accepts_isthing() {
        let json = r#"{"name": "sky", "id": 4, "isthing": false}"#;
        let cat: Category = serde_json::from_str(json).unwrap();
        assert_eq!(cat.isthing, Some(false));
    }

    #[test]
    fn category_train_id_defaults() {
        let regular: Category = serde_json::from_str(r#"{"name": "a", "id": 5}"#).unwrap();
        assert_eq!(regular.train_id_or_default(), 255);
        let void: Category = serde_json::from_str(r#"{"name": "v", "id": -1}"#).unwrap();
        assert_eq!(void.train_id_or_default(), -1);
    }

    // --- ImageId ---

    #[test]
    fn image_id_number_or_name() {
        let n: ImageId = serde_json::from_str("17").unwrap();
        assert_eq!(n, ImageId::Number(17));
        assert_eq!(n.to_string(), "17");
        let s: ImageId = serde_json::from_str(r#""val/munich_000001""#).unwrap();
        assert_eq!(s.to_string(), "val/munich_000001");
    }

    // --- Delta wire format ---

    #[test]
    fn delta_segment_with_labels() {
        let json = r#"{"id": 2, "old": "sky", "new": "building", "bbox": [0, 0, 20, 20]}"#;
        let d: DeltaSegment = serde_json::from_str(json).unwrap();
        assert_eq!(d.old, CategoryRef::Label("sky".to_owned()));
        assert_eq!(d.new, CategoryRef::Label("building".to_owned()));
        assert!(d.bbox_vis.is_none());
    }

    #[test]
    fn delta_segment_with_ids_and_visible_bbox() {
        let json = r#"{"id": 2, "old": 11, "new": 12, "bbox": [0, 0, 20, 20], "bbox_vis": [1, 1, 18, 18]}"#;
        let d: DeltaSegment = serde_json::from_str(json).unwrap();
        assert_eq!(d.old, CategoryRef::Id(11));
        assert_eq!(d.bbox_vis, Some(BBox::new(1, 1, 18, 18)));
    }

    // --- Document round-trips ---

    #[test]
    fn panoptic_document_round_trip() {
        let json = r#"{
            "images": [{"id": 1, "file_name": "a.jpg"}],
            "categories": [{"name": "sky", "id": 3, "isthing": false}],
            "annotations": [{
                "image_id": 1,
                "file_name": "a.png",
                "segments_info": [{"id": 9, "category_id": 3, "bbox": [0, 0, 4, 4], "area": 16, "iscrowd": 0}]
            }]
        }"#;
        let doc: PanopticDocument = serde_json::from_str(json).unwrap();
        let back = serde_json::to_string(&doc).unwrap();
        let doc2: PanopticDocument = serde_json::from_str(&back).unwrap();
        assert_eq!(doc, doc2);
    }

    #[test]
    fn polygon_file_preserves_image_dimensions() {
        let json = r#"{
            "imgHeight": 1024,
            "imgWidth": 2048,
            "objects": [{"label": "sky", "polygon": [[0.0, 0.0], [10.0, 0.0], [10.0, 5.0]]}]
        }"#;
        let file: PolygonFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.objects.len(), 1);
        let back = serde_json::to_string(&file).unwrap();
        assert!(back.contains("imgHeight"));
        assert!(back.contains("imgWidth"));
    }
}
