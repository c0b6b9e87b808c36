//! Category mapping resolution from a unified label policy document.
//!
//! A policy describes several dataset taxonomies (`per_ds`) plus a list of
//! mapping entries that tie categories of different datasets together by
//! name (`{"<dataset>_name": "..."}` keys). [`CategoryMapping::from_policy`]
//! resolves one source→target pair of datasets into id-level lookup tables,
//! which the consolidation engine then consumes once per image.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{Category, RemapError};

/// Default source dataset of unified policies.
pub const DEFAULT_SOURCE_DATASET: &str = "wd2";

/// Default name of the category that absorbs otherwise-unmapped sources.
pub const DEFAULT_FALLBACK_NAME: &str = "unlabeled";

/// One entry of the policy's mapping list.
///
/// Entries carry one `<dataset>_name` key per dataset they relate, plus an
/// optional `instances` flag used when a dataset's own category list does
/// not state countability. The key set varies per entry, so fields are kept
/// as a map and accessed through the typed helpers below, exactly once
/// each, at mapping-build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

impl MappingEntry {
    /// The category name this entry assigns within `dataset`, if any.
    #[must_use]
    pub fn name_for(&self, dataset: &str) -> Option<&str> {
        self.fields
            .get(&format!("{dataset}_name"))
            .and_then(serde_json::Value::as_str)
    }

    /// The entry's own countable-instance flag, if stated.
    #[must_use]
    pub fn instances(&self) -> Option<bool> {
        self.fields.get("instances").and_then(serde_json::Value::as_bool)
    }
}

/// A unified label policy document.
///
/// Both sections are modelled as optional so that their absence surfaces
/// as a [`RemapError::PolicyStructure`] configuration error rather than a
/// parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Cross-dataset mapping entries.
    #[serde(default)]
    pub mapping: Option<Vec<MappingEntry>>,
    /// Category list per dataset name.
    #[serde(default)]
    pub per_ds: Option<BTreeMap<String, Vec<Category>>>,
    /// Fields this tool does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Resolved source→target category mapping for one remap job.
///
/// Built once per job and read-only thereafter. Countability tables are
/// sparse: an id absent from them has *unknown* countability, which
/// disables both stuff-joining and crowd inference for that category.
#[derive(Debug, Clone, Default)]
pub struct CategoryMapping {
    /// Source category id → target category id (many-to-one).
    pub source_to_target: HashMap<i64, i64>,
    /// Countable-instance flag per source id, where known.
    pub source_countable: HashMap<i64, bool>,
    /// Countable-instance flag per target id, where known.
    pub target_countable: HashMap<i64, bool>,
    /// Referenced target categories, deduplicated by id, sorted by id.
    pub target_categories: Vec<Category>,
}

impl CategoryMapping {
    /// Resolve `policy` for the given source/target dataset pair.
    ///
    /// The first mapping entry whose source name equals `fallback_name`
    /// determines the fallback *target* name substituted for entries that
    /// lack an explicit target; when no such entry exists the fallback
    /// name itself is used. Countability per side comes from the dataset's
    /// category flag, falling back to the entry's own `instances` key.
    ///
    /// # Errors
    ///
    /// All failures are configuration errors raised before any annotation
    /// is touched: [`RemapError::PolicyStructure`] when a required section
    /// is missing, [`RemapError::UnknownDataset`] when a requested dataset
    /// is not described, [`RemapError::MissingSourceName`] when an entry
    /// lacks the source-dataset key, and [`RemapError::UnknownCategory`]
    /// when a referenced name cannot be resolved.
    pub fn from_policy(
        policy: &PolicyDocument,
        source_dataset: &str,
        target_dataset: &str,
        fallback_name: &str,
    ) -> Result<Self, RemapError> {
        let mapping = policy
            .mapping
            .as_ref()
            .ok_or(RemapError::PolicyStructure("mapping"))?;
        let per_ds = policy
            .per_ds
            .as_ref()
            .ok_or(RemapError::PolicyStructure("per_ds"))?;

        let lookup_ds = |name: &str| -> Result<&Vec<Category>, RemapError> {
            per_ds.get(name).ok_or_else(|| RemapError::UnknownDataset {
                name: name.to_owned(),
                available: per_ds.keys().cloned().collect(),
            })
        };
        if target_dataset.is_empty() {
            return Err(RemapError::UnknownDataset {
                name: String::new(),
                available: per_ds.keys().cloned().collect(),
            });
        }
        let source_cats = lookup_ds(source_dataset)?;
        let target_cats = lookup_ds(target_dataset)?;

        let source_index: HashMap<&str, &Category> =
            source_cats.iter().map(|c| (c.name.as_str(), c)).collect();
        let target_index: HashMap<&str, &Category> =
            target_cats.iter().map(|c| (c.name.as_str(), c)).collect();

        // Single resolution step for the fallback target name: the first
        // entry mapping the fallback source category names the target that
        // absorbs entries without an explicit target.
        let fallback_target = mapping
            .iter()
            .find(|entry| entry.name_for(source_dataset) == Some(fallback_name))
            .and_then(|entry| entry.name_for(target_dataset))
            .unwrap_or(fallback_name);

        let mut resolved = Self::default();
        let mut targets_by_id: BTreeMap<i64, Category> = BTreeMap::new();
        for (index, entry) in mapping.iter().enumerate() {
            let source_name =
                entry
                    .name_for(source_dataset)
                    .ok_or_else(|| RemapError::MissingSourceName {
                        index,
                        dataset: source_dataset.to_owned(),
                    })?;
            let target_name = entry.name_for(target_dataset).unwrap_or(fallback_target);

            let source_cat =
                *source_index
                    .get(source_name)
                    .ok_or_else(|| RemapError::UnknownCategory {
                        dataset: source_dataset.to_owned(),
                        name: source_name.to_owned(),
                    })?;
            let target_cat =
                *target_index
                    .get(target_name)
                    .ok_or_else(|| RemapError::UnknownCategory {
                        dataset: target_dataset.to_owned(),
                        name: target_name.to_owned(),
                    })?;

            resolved.source_to_target.insert(source_cat.id, target_cat.id);
            if let Some(flag) = source_cat.isthing.or_else(|| entry.instances()) {
                resolved.source_countable.insert(source_cat.id, flag);
            }
            if let Some(flag) = target_cat.isthing.or_else(|| entry.instances()) {
                resolved.target_countable.insert(target_cat.id, flag);
            }
            targets_by_id
                .entry(target_cat.id)
                .or_insert_with(|| target_cat.clone());
        }

        resolved.target_categories = targets_by_id.into_values().collect();
        Ok(resolved)
    }
}

/// Countable-instance flag per category id, built from a document's own
/// category table (categories without a stated flag are omitted).
#[must_use]
pub fn countable_index(categories: &[Category]) -> HashMap<i64, bool> {
    categories
        .iter()
        .filter_map(|c| c.isthing.map(|flag| (c.id, flag)))
        .collect()
}
