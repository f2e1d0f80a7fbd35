//! CDC Schema Triads
//!
//! Versioned, content-addressed Avro schemas for change-data-capture tables,
//! and the machinery to decide whether one generation of them can evolve into
//! the next.
//!
//! ## Features
//!
//! - **Schema Triads**: key (optional), value and envelope schema per table
//! - **Checksum Validation**: SHA256 checksums ensure artifact integrity
//! - **Compatibility Checking**: pluggable oracle, Avro resolution rules by default
//! - **Change Detection**: field- and key-order insensitive equality
//! - **CI Verdicts**: strict mode failing on any drift
//!
//! ## Architecture
//!
//! ```text
//! generation/
//! ├── db.public.artist.key.avsc
//! ├── db.public.artist.val.avsc
//! ├── db.public.artist.env.avsc
//! ├── db.public.artist.sha256
//! ├── db.public.playlist.val.avsc     (no primary key: no key schema)
//! ├── db.public.playlist.env.avsc
//! ├── db.public.playlist.sha256
//! └── manifest.json
//! ```

pub mod catalog;
pub mod change;
pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod engine;
pub mod error;
pub mod generate;
pub mod git;
pub mod manifest;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod store;
pub mod triad;
pub mod verdict;

pub use catalog::{Catalog, CatalogDiff};
pub use change::{detect_changes, ChangeResult};
pub use checksum::Checksum;
pub use compatibility::{
    AvroCompatibilityOracle, CompatibilityLevel, CompatibilityOracle, CompatibilityResult,
};
pub use config::ToolConfig;
pub use engine::{ComparisonEngine, EntityComparison};
pub use error::{Result, SchemaError};
pub use generate::{FetchRequest, Generator, RawTableSchema, TableSchemaFetcher};
pub use git::GitInfo;
pub use manifest::{verify_generation, GenerationManifest};
pub use normalize::EqualityNormalizer;
pub use report::{CompareFilesReport, CompareReport};
pub use schema::StructuredSchema;
pub use store::{ArtifactStore, SchemaFile};
pub use triad::{SchemaRole, SchemaTriad};
pub use verdict::{Decision, Verdict, VerdictPolicy};
