//! Schema compatibility checking
//!
//! Whether a NEXT schema can replace the CURRENT one is decided by a
//! [`CompatibilityOracle`]. The default [`AvroCompatibilityOracle`] delegates
//! the rule matrix to `apache_avro`'s schema resolution checks.
//!
//! Key schemas get special treatment before the oracle is consulted: a table
//! gaining or losing its primary key is always reported, whatever the level.

use std::fmt;
use std::str::FromStr;

use apache_avro::schema_compatibility::SchemaCompatibility;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, SchemaError};
use crate::schema::StructuredSchema;
use crate::triad::{SchemaRole, SchemaTriad};

/// Compatibility policy applied between two schema versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CompatibilityLevel {
    /// Every change is accepted
    None,
    /// The new schema can read data written with the latest previous schema
    #[default]
    Backward,
    /// The new schema can read data written with every previous schema
    BackwardTransitive,
    /// The latest previous schema can read data written with the new schema
    Forward,
    /// Every previous schema can read data written with the new schema
    ForwardTransitive,
    /// Backward and forward against the latest previous schema
    Full,
    /// Backward and forward against every previous schema
    FullTransitive,
}

impl CompatibilityLevel {
    pub const ALL: [CompatibilityLevel; 7] = [
        CompatibilityLevel::None,
        CompatibilityLevel::Backward,
        CompatibilityLevel::BackwardTransitive,
        CompatibilityLevel::Forward,
        CompatibilityLevel::ForwardTransitive,
        CompatibilityLevel::Full,
        CompatibilityLevel::FullTransitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompatibilityLevel::None => "NONE",
            CompatibilityLevel::Backward => "BACKWARD",
            CompatibilityLevel::BackwardTransitive => "BACKWARD_TRANSITIVE",
            CompatibilityLevel::Forward => "FORWARD",
            CompatibilityLevel::ForwardTransitive => "FORWARD_TRANSITIVE",
            CompatibilityLevel::Full => "FULL",
            CompatibilityLevel::FullTransitive => "FULL_TRANSITIVE",
        }
    }

    /// Checked against every previous schema, not only the latest
    pub fn is_transitive(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::BackwardTransitive
                | CompatibilityLevel::ForwardTransitive
                | CompatibilityLevel::FullTransitive
        )
    }

    /// New schema must read old data
    pub fn checks_backward(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::Backward
                | CompatibilityLevel::BackwardTransitive
                | CompatibilityLevel::Full
                | CompatibilityLevel::FullTransitive
        )
    }

    /// Old schema must read new data
    pub fn checks_forward(&self) -> bool {
        matches!(
            self,
            CompatibilityLevel::Forward
                | CompatibilityLevel::ForwardTransitive
                | CompatibilityLevel::Full
                | CompatibilityLevel::FullTransitive
        )
    }
}

impl fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompatibilityLevel {
    type Err = String;

    /// Case-insensitive; `-` and `_` are interchangeable
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|l| l.as_str()).collect();
                format!("unknown compatibility level '{}' (expected one of {})", s, known.join(", "))
            })
    }
}

impl TryFrom<String> for CompatibilityLevel {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompatibilityLevel> for String {
    fn from(level: CompatibilityLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Decides whether a schema may replace its predecessors
pub trait CompatibilityOracle: Send + Sync {
    /// Violations of `level` when `next` follows `previous`.
    ///
    /// `previous` is in chronological order; its last element is the latest
    /// schema. An empty result means compatible.
    fn is_compatible(
        &self,
        next: &StructuredSchema,
        previous: &[&StructuredSchema],
        level: CompatibilityLevel,
    ) -> Result<Vec<String>>;
}

/// Oracle backed by Avro schema resolution rules
#[derive(Debug, Default, Clone, Copy)]
pub struct AvroCompatibilityOracle;

impl AvroCompatibilityOracle {
    pub fn new() -> Self {
        Self
    }
}

impl CompatibilityOracle for AvroCompatibilityOracle {
    fn is_compatible(
        &self,
        next: &StructuredSchema,
        previous: &[&StructuredSchema],
        level: CompatibilityLevel,
    ) -> Result<Vec<String>> {
        let against: &[&StructuredSchema] = if level.is_transitive() {
            previous
        } else {
            previous.last().map(std::slice::from_ref).unwrap_or(&[])
        };

        let mut violations = Vec::new();
        for old in against {
            if level.checks_backward() {
                if let Err(e) = SchemaCompatibility::can_read(old.avro(), next.avro()) {
                    violations.push(format!(
                        "{}: new schema cannot read data written with {}: {}",
                        level,
                        label(old),
                        e
                    ));
                }
            }
            if level.checks_forward() {
                if let Err(e) = SchemaCompatibility::can_read(next.avro(), old.avro()) {
                    violations.push(format!(
                        "{}: {} cannot read data written with new schema: {}",
                        level,
                        label(old),
                        e
                    ));
                }
            }
        }

        Ok(violations)
    }
}

fn label(schema: &StructuredSchema) -> String {
    match schema.name() {
        Some(name) => format!("previous schema '{}'", name),
        None => "previous schema".to_string(),
    }
}

/// Violations found between two triads of the same table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub level: CompatibilityLevel,
    pub key: Vec<String>,
    pub value: Vec<String>,
    pub envelope: Vec<String>,
}

impl CompatibilityResult {
    pub fn is_compatible(&self) -> bool {
        self.key.is_empty() && self.value.is_empty() && self.envelope.is_empty()
    }

    /// Number of violations over all three roles
    pub fn total(&self) -> usize {
        self.key.len() + self.value.len() + self.envelope.len()
    }

    pub fn for_role(&self, role: SchemaRole) -> &[String] {
        match role {
            SchemaRole::Key => &self.key,
            SchemaRole::Value => &self.value,
            SchemaRole::Envelope => &self.envelope,
        }
    }
}

/// Check every role of `next` against `current`.
///
/// A key appearing or disappearing yields exactly one message naming the
/// transition; the oracle only sees keys present on both sides. Oracle
/// failures are fatal and reported as [`SchemaError::Oracle`].
pub fn check_triads(
    oracle: &dyn CompatibilityOracle,
    level: CompatibilityLevel,
    current: &SchemaTriad,
    next: &SchemaTriad,
) -> Result<CompatibilityResult> {
    let identifier = next.identifier();

    let key = match (current.key_schema(), next.key_schema()) {
        (None, None) => Vec::new(),
        (None, Some(now)) => vec![format!(
            "Key Schema for '{}' changed from NULL to NOT NULL (now: {})",
            identifier,
            now.canonical_str()
        )],
        (Some(was), None) => vec![format!(
            "Key Schema for '{}' changed from NOT NULL to NULL (was: {})",
            identifier,
            was.canonical_str()
        )],
        (Some(was), Some(now)) => check_schemas(oracle, level, identifier, was, now)?,
    };
    let value = check_schemas(
        oracle,
        level,
        identifier,
        current.value_schema(),
        next.value_schema(),
    )?;
    let envelope = check_schemas(
        oracle,
        level,
        identifier,
        current.envelope_schema(),
        next.envelope_schema(),
    )?;

    let result = CompatibilityResult {
        level,
        key,
        value,
        envelope,
    };

    for role in SchemaRole::ALL {
        for message in result.for_role(role) {
            error!("{} schema of '{}' is incompatible: {}", role, identifier, message);
        }
    }
    debug!(
        "Checked '{}' at {}: {} incompatibilities",
        identifier,
        level,
        result.total()
    );

    Ok(result)
}

/// Check a single schema against its predecessor, wrapping oracle failures
pub fn check_schemas(
    oracle: &dyn CompatibilityOracle,
    level: CompatibilityLevel,
    identifier: &str,
    current: &StructuredSchema,
    next: &StructuredSchema,
) -> Result<Vec<String>> {
    oracle
        .is_compatible(next, &[current], level)
        .map_err(|e| match e {
            SchemaError::Oracle { .. } => e,
            other => SchemaError::Oracle {
                identifier: identifier.to_string(),
                reason: other.to_string(),
            },
        })
}
