//! Structured schema documents
//!
//! A [`StructuredSchema`] keeps both the JSON document of an Avro schema and its
//! parsed form. The JSON document drives checksums and change detection; the
//! parsed form is what the compatibility oracle works with.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use apache_avro::Schema as AvroSchema;
use serde_json::{Map, Value};
use tracing::trace;

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};

/// File extension of persisted schema documents
pub const SCHEMA_EXTENSION: &str = "avsc";

/// An Avro schema together with the JSON document it was parsed from
#[derive(Debug, Clone)]
pub struct StructuredSchema {
    /// The schema document
    document: Value,
    /// Compact JSON form of `document`; the content that checksums cover
    canonical: String,
    /// Parsed Avro schema
    parsed: AvroSchema,
}

impl StructuredSchema {
    /// Build a schema from its JSON document
    pub fn from_json(document: Value) -> Result<Self> {
        let parsed = AvroSchema::parse(&document)?;
        Self::with_parsed(document, parsed)
    }

    /// Parse a schema from JSON text
    pub fn parse_str(input: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(input)?;
        Self::from_json(document)
    }

    /// Build a schema whose document may reference named types declared in
    /// `includes`.
    ///
    /// Each included definition is inlined at its first use, so the stored
    /// document is self-contained and compares equal to the same schema written
    /// out in full.
    pub fn from_json_with_includes(document: Value, includes: &[Value]) -> Result<Self> {
        if includes.is_empty() {
            return Self::from_json(document);
        }

        let mut document = document;
        IncludeResolver::new(includes).resolve(&mut document, None);
        Self::from_json(document)
    }

    /// Parse a schema that may reference named types declared in `includes`
    pub fn parse_str_with_includes(input: &str, includes: &[String]) -> Result<Self> {
        let document: Value = serde_json::from_str(input)?;
        let includes = includes
            .iter()
            .map(|include| serde_json::from_str(include))
            .collect::<std::result::Result<Vec<Value>, _>>()?;
        Self::from_json_with_includes(document, &includes)
    }

    /// Read the JSON document of a schema file
    pub fn read_document(path: &Path) -> Result<Value> {
        if !path.is_file() {
            return Err(SchemaError::parse(path, "schema file not found"));
        }
        let content = fs::read_to_string(path).map_err(|e| SchemaError::parse(path, e))?;
        serde_json::from_str(&content).map_err(|e| SchemaError::parse(path, e))
    }

    /// Read and parse a schema file.
    ///
    /// A missing file, unreadable file, malformed JSON or invalid Avro all map to
    /// [`SchemaError::Parse`] naming the file.
    pub fn read_file(path: &Path, includes: &[Value]) -> Result<Self> {
        let document = Self::read_document(path)?;
        Self::from_json_with_includes(document, includes).map_err(|e| match e {
            SchemaError::Parse { .. } => e,
            other => SchemaError::parse(path, other),
        })
    }

    fn with_parsed(document: Value, parsed: AvroSchema) -> Result<Self> {
        let canonical = serde_json::to_string(&document)?;
        Ok(Self {
            document,
            canonical,
            parsed,
        })
    }

    /// The JSON document
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// The parsed Avro schema
    pub fn avro(&self) -> &AvroSchema {
        &self.parsed
    }

    /// Canonical string form covered by checksums
    pub fn canonical_str(&self) -> &str {
        &self.canonical
    }

    /// Checksum of the canonical string form
    pub fn checksum(&self) -> Checksum {
        Checksum::of_str(&self.canonical)
    }

    /// Pretty-printed document, as written to disk
    pub fn to_pretty_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    /// Declared name of a named schema (record, enum, fixed)
    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    /// Namespace of a named schema, as Avro resolves it.
    ///
    /// A dotted name carries its own namespace and any `namespace` attribute is
    /// ignored.
    pub fn namespace(&self) -> Option<&str> {
        self.parsed.name().and_then(|name| name.namespace.as_deref())
    }
}

const PRIMITIVE_TYPES: [&str; 8] = [
    "null", "boolean", "int", "long", "float", "double", "bytes", "string",
];

/// Inlines named types declared by include documents into a schema document
struct IncludeResolver {
    /// Include definitions by full name
    declared: BTreeMap<String, Value>,
    /// Full names already defined in the document being resolved
    defined: BTreeSet<String>,
}

impl IncludeResolver {
    fn new(includes: &[Value]) -> Self {
        let mut declared = BTreeMap::new();
        for include in includes {
            let definitions: Vec<&Value> = match include {
                Value::Array(branches) => branches.iter().collect(),
                other => vec![other],
            };
            for definition in definitions {
                if let Some(full_name) = definition.as_object().and_then(|o| declared_name(o, None)) {
                    declared.entry(full_name).or_insert_with(|| definition.clone());
                }
            }
        }

        Self {
            declared,
            defined: BTreeSet::new(),
        }
    }

    fn resolve(&mut self, schema: &mut Value, namespace: Option<&str>) {
        match schema {
            Value::String(reference) => {
                if PRIMITIVE_TYPES.contains(&reference.as_str()) {
                    return;
                }
                let full_name = qualify(reference, namespace);
                if self.defined.contains(&full_name) || self.defined.contains(reference.as_str()) {
                    return;
                }
                let definition = self
                    .declared
                    .get(&full_name)
                    .or_else(|| self.declared.get(reference.as_str()))
                    .cloned();
                if let Some(definition) = definition {
                    trace!("Inlining included type '{}'", full_name);
                    *schema = definition;
                    self.resolve(schema, namespace);
                }
            }
            Value::Array(branches) => {
                for branch in branches {
                    self.resolve(branch, namespace);
                }
            }
            Value::Object(object) => {
                let kind = object.get("type").and_then(Value::as_str).map(str::to_owned);
                match kind.as_deref() {
                    Some("record" | "error") => {
                        let full_name = declared_name(object, namespace);
                        let inner = full_name
                            .as_deref()
                            .and_then(|name| name.rsplit_once('.'))
                            .map(|(inner, _)| inner.to_string());
                        if let Some(full_name) = full_name {
                            self.defined.insert(full_name);
                        }
                        if let Some(Value::Array(fields)) = object.get_mut("fields") {
                            for field in fields {
                                if let Some(field_type) = field.get_mut("type") {
                                    self.resolve(field_type, inner.as_deref());
                                }
                            }
                        }
                    }
                    Some("enum" | "fixed") => {
                        if let Some(full_name) = declared_name(object, namespace) {
                            self.defined.insert(full_name);
                        }
                    }
                    Some("array") => {
                        if let Some(items) = object.get_mut("items") {
                            self.resolve(items, namespace);
                        }
                    }
                    Some("map") => {
                        if let Some(values) = object.get_mut("values") {
                            self.resolve(values, namespace);
                        }
                    }
                    _ => {
                        if let Some(inner) = object.get_mut("type") {
                            self.resolve(inner, namespace);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Full name of a named type definition
fn declared_name(definition: &Map<String, Value>, enclosing: Option<&str>) -> Option<String> {
    let name = definition.get("name")?.as_str()?;
    let namespace = definition
        .get("namespace")
        .and_then(Value::as_str)
        .or(enclosing);
    Some(qualify(name, namespace))
}

fn qualify(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(namespace) if !namespace.is_empty() && !name.contains('.') => {
            format!("{}.{}", namespace, name)
        }
        _ => name.to_string(),
    }
}

/// Replace a top-level union by its first non-`null` branch.
///
/// Converters commonly emit optional records as `["null", {record}]`; only the
/// record part describes the table.
pub fn unwrap_nullable_union(document: Value) -> Value {
    match document {
        Value::Array(mut branches) => {
            match branches.iter().position(|b| b.as_str() != Some("null")) {
                Some(index) => branches.swap_remove(index),
                None => Value::Array(branches),
            }
        }
        other => other,
    }
}
