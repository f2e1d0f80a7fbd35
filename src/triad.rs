//! Schema triads
//!
//! A [`SchemaTriad`] describes one table as the three Avro schemas a CDC
//! producer emits for it: the key (absent for tables without a primary key),
//! the value (one row) and the envelope (the change event wrapping the value).

use std::fmt;

use serde_json::Value;

use crate::checksum::Checksum;
use crate::error::Result;
use crate::schema::{unwrap_nullable_union, StructuredSchema, SCHEMA_EXTENSION};

/// File extension of triad checksum siblings
pub const CHECKSUM_EXTENSION: &str = "sha256";

/// Which member of a triad a schema plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaRole {
    Key,
    Value,
    Envelope,
}

impl SchemaRole {
    pub const ALL: [SchemaRole; 3] = [SchemaRole::Key, SchemaRole::Value, SchemaRole::Envelope];

    /// Short infix used in artifact file names
    pub fn file_infix(&self) -> &'static str {
        match self {
            SchemaRole::Key => "key",
            SchemaRole::Value => "val",
            SchemaRole::Envelope => "env",
        }
    }

    /// File name of this role's schema for the given table
    pub fn filename(&self, identifier: &str) -> String {
        format!("{}.{}.{}", identifier, self.file_infix(), SCHEMA_EXTENSION)
    }
}

impl fmt::Display for SchemaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SchemaRole::Key => "Key",
            SchemaRole::Value => "Value",
            SchemaRole::Envelope => "Envelope",
        };
        f.write_str(label)
    }
}

/// Key, value and envelope schemas of one table, plus identity and checksum.
///
/// Triads are immutable: the checksum is computed once at construction and
/// always matches the schemas it was computed from.
#[derive(Debug, Clone)]
pub struct SchemaTriad {
    identifier: String,
    key_schema: Option<StructuredSchema>,
    value_schema: StructuredSchema,
    envelope_schema: StructuredSchema,
    checksum: Checksum,
}

impl SchemaTriad {
    /// Create a triad, computing its checksum
    pub fn new(
        identifier: impl Into<String>,
        key_schema: Option<StructuredSchema>,
        value_schema: StructuredSchema,
        envelope_schema: StructuredSchema,
    ) -> Self {
        let checksum = Self::compute_checksum(
            key_schema.as_ref(),
            &value_schema,
            &envelope_schema,
        );
        Self {
            identifier: identifier.into(),
            key_schema,
            value_schema,
            envelope_schema,
            checksum,
        }
    }

    /// Create a triad from raw schema documents as produced by a converter.
    ///
    /// Top-level nullable unions are reduced to their record branch first.
    pub fn from_documents(
        identifier: impl Into<String>,
        key: Option<Value>,
        value: Value,
        envelope: Value,
    ) -> Result<Self> {
        let key_schema = key
            .map(|k| StructuredSchema::from_json(unwrap_nullable_union(k)))
            .transpose()?;
        let value_schema = StructuredSchema::from_json(unwrap_nullable_union(value))?;
        let envelope_schema = StructuredSchema::from_json(unwrap_nullable_union(envelope))?;
        Ok(Self::new(identifier, key_schema, value_schema, envelope_schema))
    }

    /// Digest over `key\n` (when present), `value\n` and `envelope\n`
    pub fn compute_checksum(
        key_schema: Option<&StructuredSchema>,
        value_schema: &StructuredSchema,
        envelope_schema: &StructuredSchema,
    ) -> Checksum {
        let parts = key_schema
            .into_iter()
            .chain([value_schema, envelope_schema])
            .map(StructuredSchema::canonical_str);
        Checksum::of_lines(parts)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn key_schema(&self) -> Option<&StructuredSchema> {
        self.key_schema.as_ref()
    }

    pub fn value_schema(&self) -> &StructuredSchema {
        &self.value_schema
    }

    pub fn envelope_schema(&self) -> &StructuredSchema {
        &self.envelope_schema
    }

    /// Schema for a role; only the key can be absent
    pub fn schema(&self, role: SchemaRole) -> Option<&StructuredSchema> {
        match role {
            SchemaRole::Key => self.key_schema.as_ref(),
            SchemaRole::Value => Some(&self.value_schema),
            SchemaRole::Envelope => Some(&self.envelope_schema),
        }
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// File name of the checksum sibling
    pub fn checksum_filename(&self) -> String {
        checksum_filename(&self.identifier)
    }
}

/// File name of the checksum sibling for a table
pub fn checksum_filename(identifier: &str) -> String {
    format!("{}.{}", identifier, CHECKSUM_EXTENSION)
}

/// Check that a table identifier names files inside a generation directory
/// and nowhere else
pub fn validate_identifier(identifier: &str) -> std::result::Result<(), String> {
    if identifier.is_empty() {
        return Err("empty table identifier".to_string());
    }
    if identifier.contains(['/', '\\']) || identifier.contains("..") {
        return Err(format!("table identifier '{}' escapes the generation directory", identifier));
    }
    Ok(())
}
