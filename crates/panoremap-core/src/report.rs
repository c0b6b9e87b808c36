//! Job reports: success, warning, and error accumulation.
//!
//! Reports are purely observational and produced fresh per run. Per-worker
//! reports merge commutatively (counters add, lists concatenate), so a
//! parallel job can fold them in any order.

use serde::{Deserialize, Serialize};

/// One accumulated warning or error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// The image/record key the condition occurred on.
    pub key: String,
    /// Offending segment id, where one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Human-readable reason.
    pub reason: String,
}

/// Accumulated outcome of one batch job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Number of successfully applied operations.
    pub success_count: usize,
    /// Non-fatal per-record failures.
    pub errors: Vec<ReportEntry>,
    /// Non-fatal conditions that did not block any operation.
    pub warnings: Vec<ReportEntry>,
}

impl JobReport {
    /// Record a per-record error.
    pub fn error(&mut self, key: impl Into<String>, id: Option<i64>, reason: impl Into<String>) {
        self.errors.push(ReportEntry {
            key: key.into(),
            id,
            reason: reason.into(),
        });
    }

    /// Record a warning.
    pub fn warning(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.warnings.push(ReportEntry {
            key: key.into(),
            id: None,
            reason: reason.into(),
        });
    }

    /// Fold another report into this one. Commutative up to list order,
    /// which is not significant.
    pub fn merge(&mut self, other: Self) {
        self.success_count += other.success_count;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Whether the job completed without errors or warnings.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}
