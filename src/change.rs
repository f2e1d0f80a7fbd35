//! Change detection between schema versions

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use tracing::debug;

use crate::error::Result;
use crate::normalize::EqualityNormalizer;
use crate::schema::StructuredSchema;
use crate::triad::{SchemaRole, SchemaTriad};

/// Which roles of a triad differ semantically between two generations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub key_changed: bool,
    pub value_changed: bool,
    pub envelope_changed: bool,
}

impl ChangeResult {
    pub fn any_changed(&self) -> bool {
        self.key_changed || self.value_changed || self.envelope_changed
    }

    pub fn changed_count(&self) -> usize {
        [self.key_changed, self.value_changed, self.envelope_changed]
            .iter()
            .filter(|changed| **changed)
            .count()
    }

    pub fn is_changed(&self, role: SchemaRole) -> bool {
        match role {
            SchemaRole::Key => self.key_changed,
            SchemaRole::Value => self.value_changed,
            SchemaRole::Envelope => self.envelope_changed,
        }
    }
}

/// Compare two triads role by role, ignoring key and field order.
///
/// A key present on one side only counts as a key change.
pub fn detect_changes(current: &SchemaTriad, next: &SchemaTriad) -> ChangeResult {
    let normalizer = EqualityNormalizer::new();
    let differs = |a: Option<&StructuredSchema>, b: Option<&StructuredSchema>| match (a, b) {
        (None, None) => false,
        (Some(a), Some(b)) => !normalizer.equal(a.document(), b.document()),
        _ => true,
    };

    let result = ChangeResult {
        key_changed: differs(current.key_schema(), next.key_schema()),
        value_changed: differs(Some(current.value_schema()), Some(next.value_schema())),
        envelope_changed: differs(Some(current.envelope_schema()), Some(next.envelope_schema())),
    };

    for role in SchemaRole::ALL {
        if result.is_changed(role) {
            debug!("{} schema of '{}' changed", role, next.identifier());
        }
    }

    result
}

/// Whether two single schemas differ semantically
pub fn schemas_differ(current: &StructuredSchema, next: &StructuredSchema) -> bool {
    !EqualityNormalizer::new().equal(current.document(), next.document())
}

/// Unified line diff of the canonical forms of two schemas.
///
/// Empty when the schemas are semantically equal.
pub fn describe_change(current: &StructuredSchema, next: &StructuredSchema) -> Result<String> {
    let normalizer = EqualityNormalizer::new();
    let old_text = serde_json::to_string_pretty(&normalizer.normalize(current.document()))?;
    let new_text = serde_json::to_string_pretty(&normalizer.normalize(next.document()))?;

    if old_text == new_text {
        return Ok(String::new());
    }

    let diff = TextDiff::from_lines(&old_text, &new_text);
    Ok(diff
        .unified_diff()
        .context_radius(3)
        .header("current", "next")
        .to_string())
}
