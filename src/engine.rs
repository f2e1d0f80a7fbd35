//! Comparison engine
//!
//! Orchestrates a comparison run: catalogs of both generations are diffed and
//! every table present in both is checked for compatibility and for semantic
//! changes. Tables are independent, so they are evaluated on the `rayon` pool
//! unless parallelism is turned off; per-table results are then folded into
//! a [`CompareReport`] on the calling thread.
//!
//! Any per-table error aborts the whole run. No partial report is produced.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, enabled, error, info, warn, Level};

use crate::catalog::Catalog;
use crate::change::{describe_change, detect_changes, schemas_differ, ChangeResult};
use crate::compatibility::{
    check_schemas, check_triads, AvroCompatibilityOracle, CompatibilityLevel, CompatibilityOracle,
    CompatibilityResult,
};
use crate::error::Result;
use crate::manifest::GenerationManifest;
use crate::report::{CompareFilesReport, CompareReport};
use crate::store::{ArtifactStore, SchemaFile};
use crate::triad::SchemaTriad;

/// Result of comparing one table across two generations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityComparison {
    pub identifier: String,
    pub compatibility: CompatibilityResult,
    pub changes: ChangeResult,
}

/// Compares generations of schema triads under one compatibility level
pub struct ComparisonEngine {
    oracle: Box<dyn CompatibilityOracle>,
    level: CompatibilityLevel,
    parallel: bool,
}

impl ComparisonEngine {
    /// Engine backed by the Avro oracle, evaluating tables in parallel
    pub fn new(level: CompatibilityLevel) -> Self {
        Self::with_oracle(Box::new(AvroCompatibilityOracle::new()), level)
    }

    /// Engine backed by a custom oracle
    pub fn with_oracle(oracle: Box<dyn CompatibilityOracle>, level: CompatibilityLevel) -> Self {
        Self {
            oracle,
            level,
            parallel: true,
        }
    }

    /// Enable or disable evaluating tables on the thread pool
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn level(&self) -> CompatibilityLevel {
        self.level
    }

    /// Compare every table of two generation directories
    pub fn compare_generations(&self, current_dir: &Path, next_dir: &Path) -> Result<CompareReport> {
        if same_location(current_dir, next_dir) {
            warn!("Comparing a schema directory with itself: {}", current_dir.display());
        }

        let current_manifest = GenerationManifest::load(current_dir)?;
        let next_manifest = GenerationManifest::load(next_dir)?;
        if current_manifest.catalog_checksum == next_manifest.catalog_checksum {
            info!("Catalog checksums are identical: {}", current_manifest.catalog_checksum);
        }

        let diff = Catalog::from_manifest(&current_manifest).diff(&Catalog::from_manifest(&next_manifest));
        for identifier in &diff.removed {
            warn!(
                "Table '{}' not found in NEXT: skipping compatibility check (table dropped?)",
                identifier
            );
        }
        for identifier in &diff.added {
            debug!("Table '{}' only present in NEXT", identifier);
        }

        let current = ArtifactStore::new(current_dir);
        let next = ArtifactStore::new(next_dir);
        debug!(
            "Comparing {} tables at {} ({})",
            diff.common.len(),
            self.level,
            if self.parallel { "parallel" } else { "sequential" }
        );

        let comparisons = if self.parallel {
            diff.common
                .par_iter()
                .map(|identifier| self.compare_entity(&current, &next, identifier))
                .collect::<Result<Vec<_>>>()?
        } else {
            diff.common
                .iter()
                .map(|identifier| self.compare_entity(&current, &next, identifier))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(CompareReport::new(
            current_dir,
            next_dir,
            self.level,
            &diff,
            comparisons,
        ))
    }

    /// Load one table from both stores and compare it
    pub fn compare_entity(
        &self,
        current: &ArtifactStore,
        next: &ArtifactStore,
        identifier: &str,
    ) -> Result<EntityComparison> {
        debug!("Checking compatibility '{}' for table '{}'", self.level, identifier);
        let current_triad = current.load(identifier)?;
        let next_triad = next.load(identifier)?;
        self.compare_triads(&current_triad, &next_triad)
    }

    /// Compare two triads of the same table
    pub fn compare_triads(&self, current: &SchemaTriad, next: &SchemaTriad) -> Result<EntityComparison> {
        let compatibility = check_triads(self.oracle.as_ref(), self.level, current, next)?;
        let changes = detect_changes(current, next);

        if compatibility.is_compatible() {
            info!("Compatibility for table '{}' preserved", next.identifier());
        }
        if changes.any_changed() {
            debug!(
                "Schema changes detected for table '{}': key={}, value={}, envelope={}",
                next.identifier(),
                changes.key_changed,
                changes.value_changed,
                changes.envelope_changed
            );
        }

        Ok(EntityComparison {
            identifier: next.identifier().to_string(),
            compatibility,
            changes,
        })
    }

    /// Compare two standalone schema files.
    ///
    /// `includes` declare named types both files may refer to.
    pub fn compare_files(
        &self,
        current_file: &Path,
        next_file: &Path,
        includes: &[PathBuf],
    ) -> Result<CompareFilesReport> {
        let current = SchemaFile::load_path(current_file, includes)?;
        let next = SchemaFile::load_path(next_file, includes)?;

        let incompatibilities = check_schemas(
            self.oracle.as_ref(),
            self.level,
            next.identifier(),
            current.schema(),
            next.schema(),
        )?;
        for message in &incompatibilities {
            error!("Schema '{}' is incompatible: {}", next.identifier(), message);
        }

        let has_schema_changes = schemas_differ(current.schema(), next.schema());
        if has_schema_changes && enabled!(Level::DEBUG) {
            debug!("Schema changes:\n{}", describe_change(current.schema(), next.schema())?);
        }

        Ok(CompareFilesReport::new(
            current_file,
            next_file,
            self.level,
            incompatibilities,
            has_schema_changes,
        ))
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
