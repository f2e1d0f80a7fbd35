//! Comparison reports
//!
//! Reports are plain data: they carry everything a verdict needs and serialize
//! to the JSON document the CLI emits. Derived totals are computed once, when
//! the report is assembled.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogDiff;
use crate::compatibility::CompatibilityLevel;
use crate::engine::EntityComparison;
use crate::error::Result;

/// Outcome of comparing two generation directories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareReport {
    pub current_schemas_dir: PathBuf,
    pub next_schemas_dir: PathBuf,
    pub compatibility_level: CompatibilityLevel,
    /// Key violations per compared table (empty list when compatible)
    pub key_incompatibilities: BTreeMap<String, Vec<String>>,
    pub key_incompatibilities_total: usize,
    pub value_incompatibilities: BTreeMap<String, Vec<String>>,
    pub value_incompatibilities_total: usize,
    pub envelope_incompatibilities: BTreeMap<String, Vec<String>>,
    pub envelope_incompatibilities_total: usize,
    pub incompatibilities_total: usize,
    /// Tables present in CURRENT only
    pub removed_tables: BTreeSet<String>,
    /// Tables present in NEXT only
    pub added_tables: BTreeSet<String>,
    /// Whether the key schema of each compared table changed
    pub key_schema_changed: BTreeMap<String, bool>,
    pub value_schema_changed: BTreeMap<String, bool>,
    pub envelope_schema_changed: BTreeMap<String, bool>,
    /// Compared tables with at least one changed schema
    pub tables_with_changes: BTreeSet<String>,
    pub total_tables_with_changes: usize,
    pub has_any_schema_changes: bool,
}

impl CompareReport {
    /// Assemble a report from per-table results.
    ///
    /// A single pass folds the comparisons into the per-role maps; totals are
    /// derived from the folded maps.
    pub fn new(
        current_schemas_dir: impl Into<PathBuf>,
        next_schemas_dir: impl Into<PathBuf>,
        compatibility_level: CompatibilityLevel,
        diff: &CatalogDiff,
        comparisons: impl IntoIterator<Item = EntityComparison>,
    ) -> Self {
        let mut report = Self {
            current_schemas_dir: current_schemas_dir.into(),
            next_schemas_dir: next_schemas_dir.into(),
            compatibility_level,
            key_incompatibilities: BTreeMap::new(),
            key_incompatibilities_total: 0,
            value_incompatibilities: BTreeMap::new(),
            value_incompatibilities_total: 0,
            envelope_incompatibilities: BTreeMap::new(),
            envelope_incompatibilities_total: 0,
            incompatibilities_total: 0,
            removed_tables: diff.removed.clone(),
            added_tables: diff.added.clone(),
            key_schema_changed: BTreeMap::new(),
            value_schema_changed: BTreeMap::new(),
            envelope_schema_changed: BTreeMap::new(),
            tables_with_changes: BTreeSet::new(),
            total_tables_with_changes: 0,
            has_any_schema_changes: false,
        };

        for comparison in comparisons {
            let EntityComparison {
                identifier,
                compatibility,
                changes,
            } = comparison;

            if changes.any_changed() {
                report.tables_with_changes.insert(identifier.clone());
            }
            report.key_schema_changed.insert(identifier.clone(), changes.key_changed);
            report.value_schema_changed.insert(identifier.clone(), changes.value_changed);
            report
                .envelope_schema_changed
                .insert(identifier.clone(), changes.envelope_changed);

            report.key_incompatibilities.insert(identifier.clone(), compatibility.key);
            report.value_incompatibilities.insert(identifier.clone(), compatibility.value);
            report.envelope_incompatibilities.insert(identifier, compatibility.envelope);
        }

        report.key_incompatibilities_total = count(&report.key_incompatibilities);
        report.value_incompatibilities_total = count(&report.value_incompatibilities);
        report.envelope_incompatibilities_total = count(&report.envelope_incompatibilities);
        report.incompatibilities_total = report.key_incompatibilities_total
            + report.value_incompatibilities_total
            + report.envelope_incompatibilities_total;
        report.total_tables_with_changes = report.tables_with_changes.len();
        report.has_any_schema_changes = !report.tables_with_changes.is_empty();

        report
    }

    /// Schema changes were found while the set of tables stayed the same
    pub fn has_schema_changes_without_table_changes(&self) -> bool {
        self.has_any_schema_changes && self.removed_tables.is_empty() && self.added_tables.is_empty()
    }

    /// Number of tables that were compared
    pub fn compared_tables(&self) -> usize {
        self.value_schema_changed.len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn count(incompatibilities: &BTreeMap<String, Vec<String>>) -> usize {
    incompatibilities.values().map(Vec::len).sum()
}

/// Outcome of comparing two single schema files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareFilesReport {
    pub current_schema_file: PathBuf,
    pub next_schema_file: PathBuf,
    pub compatibility_level: CompatibilityLevel,
    pub incompatibilities: Vec<String>,
    pub incompatibilities_total: usize,
    pub is_compatible: bool,
    /// The schemas differ semantically, compatible or not
    pub has_schema_changes: bool,
}

impl CompareFilesReport {
    pub fn new(
        current_schema_file: impl Into<PathBuf>,
        next_schema_file: impl Into<PathBuf>,
        compatibility_level: CompatibilityLevel,
        incompatibilities: Vec<String>,
        has_schema_changes: bool,
    ) -> Self {
        Self {
            current_schema_file: current_schema_file.into(),
            next_schema_file: next_schema_file.into(),
            compatibility_level,
            incompatibilities_total: incompatibilities.len(),
            is_compatible: incompatibilities.is_empty(),
            incompatibilities,
            has_schema_changes,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
