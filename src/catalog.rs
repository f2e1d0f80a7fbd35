//! Catalogs of table identifiers and their differences

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::manifest::GenerationManifest;

/// The set of tables in one generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    identifiers: BTreeSet<String>,
}

impl Catalog {
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: identifiers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_manifest(manifest: &GenerationManifest) -> Self {
        Self::new(manifest.identifiers())
    }

    /// Catalog of the generation stored in `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self::from_manifest(&GenerationManifest::load(dir)?))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn identifiers(&self) -> &BTreeSet<String> {
        &self.identifiers
    }

    /// How `next` differs from this catalog
    pub fn diff(&self, next: &Catalog) -> CatalogDiff {
        CatalogDiff {
            removed: self.identifiers.difference(&next.identifiers).cloned().collect(),
            added: next.identifiers.difference(&self.identifiers).cloned().collect(),
            common: self.identifiers.intersection(&next.identifiers).cloned().collect(),
        }
    }
}

/// Tables removed from, added to and kept across two generations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDiff {
    /// In CURRENT only
    pub removed: BTreeSet<String>,
    /// In NEXT only
    pub added: BTreeSet<String>,
    /// In both; the only tables that get compared
    pub common: BTreeSet<String>,
}

impl CatalogDiff {
    /// Whether any table was added or removed
    pub fn has_table_changes(&self) -> bool {
        !self.removed.is_empty() || !self.added.is_empty()
    }
}
