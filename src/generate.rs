//! Generating schema generations
//!
//! A [`TableSchemaFetcher`] introspects a database and converts each table into
//! raw key / value / envelope schema documents. The [`Generator`] turns those
//! into triads, persists them and writes the generation manifest.
//!
//! No database driver ships with this crate; fetchers are provided by callers.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::git::GitInfo;
use crate::manifest::GenerationManifest;
use crate::store::ArtifactStore;
use crate::triad::SchemaTriad;

/// Which tables to fetch from a database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Database (catalog) name
    pub database: String,
    /// Schemas to include; all when `None`
    pub included_schemas: Option<BTreeSet<String>>,
    /// Tables to include; all when `None`
    pub included_tables: Option<BTreeSet<String>>,
    /// Columns to leave out, as `schema.table.column`
    pub excluded_columns: BTreeSet<String>,
}

impl FetchRequest {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_schemas<I: IntoIterator<Item = S>, S: Into<String>>(mut self, schemas: I) -> Self {
        self.included_schemas = Some(schemas.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tables<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tables: I) -> Self {
        self.included_tables = Some(tables.into_iter().map(Into::into).collect());
        self
    }

    pub fn excluding_columns<I: IntoIterator<Item = S>, S: Into<String>>(mut self, columns: I) -> Self {
        self.excluded_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a table passes the schema and table filters
    pub fn includes(&self, schema: &str, table: &str) -> bool {
        let schema_ok = self
            .included_schemas
            .as_ref()
            .map_or(true, |schemas| schemas.contains(schema));
        let table_ok = self
            .included_tables
            .as_ref()
            .map_or(true, |tables| tables.contains(table));
        schema_ok && table_ok
    }

    /// Whether a column was asked to be left out
    pub fn excludes_column(&self, schema: &str, table: &str, column: &str) -> bool {
        self.excluded_columns
            .contains(&format!("{}.{}.{}", schema, table, column))
    }

    /// Fail when an explicitly requested schema or table was not fetched.
    ///
    /// Identifiers are expected as `catalog.schema.table`.
    pub fn ensure_found(&self, fetched: &[RawTableSchema]) -> Result<()> {
        let mut schemas = BTreeSet::new();
        let mut tables = BTreeSet::new();
        for raw in fetched {
            let mut parts = raw.identifier.splitn(3, '.').skip(1);
            if let (Some(schema), Some(table)) = (parts.next(), parts.next()) {
                schemas.insert(schema);
                tables.insert(table);
            }
        }

        let missing = |wanted: &Option<BTreeSet<String>>, found: &BTreeSet<&str>| -> Vec<String> {
            wanted
                .iter()
                .flatten()
                .filter(|name| !found.contains(name.as_str()))
                .cloned()
                .collect()
        };

        let missing_schemas = missing(&self.included_schemas, &schemas);
        if !missing_schemas.is_empty() {
            return Err(SchemaError::Fetch(format!(
                "schemas not found in '{}': {}",
                self.database,
                missing_schemas.join(", ")
            )));
        }
        let missing_tables = missing(&self.included_tables, &tables);
        if !missing_tables.is_empty() {
            return Err(SchemaError::Fetch(format!(
                "tables not found in '{}': {}",
                self.database,
                missing_tables.join(", ")
            )));
        }

        Ok(())
    }
}

/// Schema documents of one table as produced by a fetcher
#[derive(Debug, Clone, PartialEq)]
pub struct RawTableSchema {
    /// `catalog.schema.table`
    pub identifier: String,
    /// Absent for tables without a primary key
    pub key: Option<Value>,
    pub value: Value,
    pub envelope: Value,
}

impl RawTableSchema {
    pub fn into_triad(self) -> Result<SchemaTriad> {
        SchemaTriad::from_documents(self.identifier, self.key, self.value, self.envelope)
    }
}

/// Introspects a database into raw table schemas
pub trait TableSchemaFetcher {
    /// Fetch every table matching the request.
    ///
    /// Explicitly requested schemas or tables that do not exist are an error.
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawTableSchema>>;
}

/// Writes a generation directory from fetched table schemas
#[derive(Debug, Clone)]
pub struct Generator {
    output_dir: PathBuf,
    arguments: Vec<String>,
}

impl Generator {
    /// `arguments` are recorded verbatim in the manifest
    pub fn new(output_dir: impl Into<PathBuf>, arguments: Vec<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            arguments,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetch, convert and persist a whole generation
    pub fn generate(
        &self,
        fetcher: &dyn TableSchemaFetcher,
        request: &FetchRequest,
    ) -> Result<GenerationManifest> {
        let raw = fetcher.fetch(request)?;
        info!("Will convert {} table schemas", raw.len());
        for table in &raw {
            info!("  {}", table.identifier);
        }

        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(SchemaError::InvalidInput(format!(
                "output path is not a directory: {}",
                self.output_dir.display()
            )));
        }
        fs::create_dir_all(&self.output_dir)?;
        info!("Will generate schemas to: {}", self.output_dir.display());

        let mut triads = raw
            .into_par_iter()
            .map(RawTableSchema::into_triad)
            .collect::<Result<Vec<_>>>()?;
        triads.sort_by(|a, b| a.identifier().cmp(b.identifier()));

        let store = ArtifactStore::new(&self.output_dir);
        for triad in &triads {
            debug!("  {} -> {}", triad.identifier(), triad.checksum_filename());
            store.save(triad)?;
        }

        let git = GitInfo::try_discover(&self.output_dir);
        let manifest = GenerationManifest::build(&triads, self.arguments.clone(), git);
        manifest.save(&self.output_dir)?;

        Ok(manifest)
    }
}
