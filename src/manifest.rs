//! Generation manifests
//!
//! Every generation directory carries a `manifest.json` listing the tables it
//! holds, their triad checksums and how the generation was produced.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::git::GitInfo;
use crate::store::ArtifactStore;
use crate::triad::{validate_identifier, SchemaTriad};

/// File name of the manifest inside a generation directory
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Description of one generation of schema triads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationManifest {
    /// When the generation was produced
    pub created_at: DateTime<Utc>,
    /// Arguments the generation was produced with
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Number of tables in the generation
    pub table_count: usize,
    /// Triad checksum per table identifier
    pub table_checksums: BTreeMap<String, Checksum>,
    /// Digest of the sorted concatenation of all triad checksums
    pub catalog_checksum: Checksum,
    /// Provenance of the generating checkout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
}

impl GenerationManifest {
    /// Describe a set of triads
    pub fn build(triads: &[SchemaTriad], arguments: Vec<String>, git: Option<GitInfo>) -> Self {
        let table_checksums: BTreeMap<String, Checksum> = triads
            .iter()
            .map(|t| (t.identifier().to_string(), t.checksum().clone()))
            .collect();
        let catalog_checksum = Checksum::combine(table_checksums.values());

        Self {
            created_at: Utc::now(),
            arguments,
            table_count: table_checksums.len(),
            table_checksums,
            catalog_checksum,
            git,
        }
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILENAME)
    }

    /// Write `manifest.json` into `dir`
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(dir);
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        fs::write(&path, content)?;
        trace!("Saved manifest: {}", path.display());
        Ok(path)
    }

    /// Read `manifest.json` from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path_in(dir);
        if !path.is_file() {
            return Err(SchemaError::ManifestNotFound(path));
        }
        trace!("Loading manifest: {}", path.display());
        let content = fs::read_to_string(&path)?;
        let manifest: Self =
            serde_json::from_str(&content).map_err(|e| SchemaError::parse(&path, e))?;
        for identifier in manifest.identifiers() {
            validate_identifier(identifier).map_err(|reason| SchemaError::parse(&path, reason))?;
        }
        Ok(manifest)
    }

    /// Table identifiers, sorted
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.table_checksums.keys().map(String::as_str)
    }

    /// Catalog checksum recomputed from the table checksums
    pub fn recompute_catalog_checksum(&self) -> Checksum {
        Checksum::combine(self.table_checksums.values())
    }
}

/// Re-read a whole generation and check it against its manifest.
///
/// Every listed triad is loaded (which verifies its checksum sibling) and its
/// checksum must equal the manifest entry. The table count and the catalog
/// checksum must agree with the entries.
pub fn verify_generation(dir: &Path) -> Result<GenerationManifest> {
    let manifest = GenerationManifest::load(dir)?;
    let manifest_path = GenerationManifest::path_in(dir);
    let store = ArtifactStore::new(dir);

    if manifest.table_count != manifest.table_checksums.len() {
        return Err(SchemaError::parse(
            &manifest_path,
            format!(
                "table_count is {} but {} table checksums are listed",
                manifest.table_count,
                manifest.table_checksums.len()
            ),
        ));
    }

    for (identifier, expected) in &manifest.table_checksums {
        let triad = store.load(identifier)?;
        if triad.checksum() != expected {
            return Err(SchemaError::ChecksumMismatch {
                identifier: identifier.clone(),
                path: manifest_path.clone(),
                expected: expected.to_string(),
                actual: triad.checksum().to_string(),
            });
        }
        debug!("Verified '{}'", identifier);
    }

    let recomputed = manifest.recompute_catalog_checksum();
    if recomputed != manifest.catalog_checksum {
        return Err(SchemaError::ChecksumMismatch {
            identifier: "<catalog>".to_string(),
            path: manifest_path,
            expected: manifest.catalog_checksum.to_string(),
            actual: recomputed.to_string(),
        });
    }

    info!("Verified {} tables in {}", manifest.table_count, dir.display());
    Ok(manifest)
}
