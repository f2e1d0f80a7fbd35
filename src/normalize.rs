//! Order-insensitive schema equality
//!
//! Two schema documents that differ only in object key order or in the order
//! of record fields describe the same schema. [`EqualityNormalizer`] rewrites
//! a document into a canonical form so that such documents compare equal.
//!
//! Canonical form rules:
//! - object keys are sorted, recursively
//! - arrays held under a `fields` key are sorted by each element's `name`
//!   (elements without a name sort as the empty string; ties keep input order)
//! - every other array keeps its order, since union branch order and enum
//!   symbol order are significant

use serde_json::{Map, Value};

const FIELDS_KEY: &str = "fields";
const NAME_KEY: &str = "name";

/// Canonicalizes schema documents for equality checks
#[derive(Debug, Default, Clone, Copy)]
pub struct EqualityNormalizer;

impl EqualityNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Canonical form of a document. Idempotent.
    pub fn normalize(&self, document: &Value) -> Value {
        normalize_value(document, false)
    }

    /// Whether two documents have identical canonical forms
    pub fn equal(&self, a: &Value, b: &Value) -> bool {
        self.normalize(a) == self.normalize(b)
    }
}

/// Canonical form of a document
pub fn normalize(document: &Value) -> Value {
    EqualityNormalizer.normalize(document)
}

fn normalize_value(value: &Value, under_fields: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key.clone(), normalize_value(child, key == FIELDS_KEY));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => {
            let mut normalized: Vec<Value> =
                items.iter().map(|item| normalize_value(item, false)).collect();
            if under_fields {
                normalized.sort_by(|a, b| field_name(a).cmp(field_name(b)));
            }
            Value::Array(normalized)
        }
        scalar => scalar.clone(),
    }
}

fn field_name(field: &Value) -> &str {
    field.get(NAME_KEY).and_then(Value::as_str).unwrap_or("")
}
