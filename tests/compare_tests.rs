//! Comparison Tests
//!
//! End-to-end runs over temporary generation directories and the
//! `compare-files` fixtures.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use cdc_schemas::{
    ArtifactStore, AvroCompatibilityOracle, CompatibilityLevel, CompatibilityOracle,
    ComparisonEngine, GenerationManifest, SchemaError, SchemaFile, SchemaTriad, StructuredSchema,
    Verdict, VerdictPolicy,
};
use serde_json::{json, Value};
use tempfile::tempdir;

fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/compare-files")
}

fn record(name: &str, namespace: &str, fields: Value) -> Value {
    json!({ "type": "record", "name": name, "namespace": namespace, "fields": fields })
}

fn key_fields() -> Value {
    json!([{ "name": "id", "type": "int" }])
}

fn value_fields() -> Value {
    json!([
        { "name": "id", "type": "int" },
        { "name": "name", "type": "string" }
    ])
}

/// A table triad; the envelope is the same for every table
fn table(identifier: &str, key: Option<Value>, value: Value) -> SchemaTriad {
    let envelope = json!([
        { "name": "op", "type": "string" },
        { "name": "ts_ms", "type": ["null", "long"], "default": null }
    ]);
    SchemaTriad::from_documents(
        identifier,
        key.map(|fields| record("Key", identifier, fields)),
        record("Value", identifier, value),
        record("Envelope", identifier, envelope),
    )
    .unwrap()
}

fn write_generation(dir: &Path, triads: &[SchemaTriad]) {
    let store = ArtifactStore::new(dir);
    for triad in triads {
        store.save(triad).unwrap();
    }
    GenerationManifest::build(triads, vec!["--database".to_string(), "db".to_string()], None)
        .save(dir)
        .unwrap();
}

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Artifact integrity
// =============================================================================

#[test]
fn test_save_load_preserves_checksum() {
    let dir = tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let original = table("db.public.artist", Some(key_fields()), value_fields());
    store.save(&original).unwrap();

    let loaded = store.load("db.public.artist").unwrap();
    assert_eq!(loaded.checksum(), original.checksum());
    assert_eq!(
        SchemaTriad::compute_checksum(
            loaded.key_schema(),
            loaded.value_schema(),
            loaded.envelope_schema()
        ),
        *original.checksum()
    );
}

#[test]
fn test_single_byte_mutation_is_an_integrity_error() {
    let dir = tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    store
        .save(&table("db.public.artist", Some(key_fields()), value_fields()))
        .unwrap();

    let path = dir.path().join("db.public.artist.val.avsc");
    let mut bytes = fs::read(&path).unwrap();
    assert!(rename_value_field(&mut bytes));
    fs::write(&path, bytes).unwrap();

    let err = store.load("db.public.artist").unwrap_err();
    assert!(matches!(err, SchemaError::ChecksumMismatch { .. }), "got {:?}", err);
}

/// Flip one byte of the `name` field's value: `"name": "name"` becomes `"name": "nbme"`
fn rename_value_field(bytes: &mut [u8]) -> bool {
    let needle = b"\"name\": \"name\"";
    match bytes.windows(needle.len()).position(|w| w == needle.as_slice()) {
        Some(at) => {
            bytes[at + needle.len() - 4] = b'b';
            true
        }
        None => false,
    }
}

// =============================================================================
// Compatibility asymmetry
// =============================================================================

#[test]
fn test_compatibility_is_asymmetric() {
    let narrow = StructuredSchema::from_json(record("Value", "t", json!([{ "name": "a", "type": "int" }])))
        .unwrap();
    let strict = StructuredSchema::from_json(record(
        "Value",
        "t",
        json!([{ "name": "a", "type": "int" }, { "name": "b", "type": "int" }]),
    ))
    .unwrap();
    let oracle = AvroCompatibilityOracle::new();

    for _ in 0..3 {
        let a_to_b = oracle
            .is_compatible(&strict, &[&narrow], CompatibilityLevel::Backward)
            .unwrap();
        assert!(!a_to_b.is_empty());

        let b_to_a = oracle
            .is_compatible(&narrow, &[&strict], CompatibilityLevel::Backward)
            .unwrap();
        assert!(b_to_a.is_empty());

        let forward = oracle
            .is_compatible(&strict, &[&narrow], CompatibilityLevel::Forward)
            .unwrap();
        assert!(forward.is_empty());
    }
}

// =============================================================================
// Null keys
// =============================================================================

#[test]
fn test_key_appearing_is_one_incompatibility() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    write_generation(curr.path(), &[table("db.public.log", None, value_fields())]);
    write_generation(next.path(), &[table("db.public.log", Some(key_fields()), value_fields())]);

    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_generations(curr.path(), next.path())
        .unwrap();

    let key = &report.key_incompatibilities["db.public.log"];
    assert_eq!(key.len(), 1);
    assert!(key[0].contains("changed from NULL to NOT NULL"));
    assert_eq!(report.incompatibilities_total, 1);
    assert_eq!(report.key_schema_changed["db.public.log"], true);
}

#[test]
fn test_key_disappearing_is_one_incompatibility() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    write_generation(curr.path(), &[table("db.public.log", Some(key_fields()), value_fields())]);
    write_generation(next.path(), &[table("db.public.log", None, value_fields())]);

    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_generations(curr.path(), next.path())
        .unwrap();

    let key = &report.key_incompatibilities["db.public.log"];
    assert_eq!(key.len(), 1);
    assert!(key[0].contains("changed from NOT NULL to NULL"));
}

#[test]
fn test_both_keys_absent() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    write_generation(curr.path(), &[table("db.public.log", None, value_fields())]);
    write_generation(next.path(), &[table("db.public.log", None, value_fields())]);

    let report = ComparisonEngine::new(CompatibilityLevel::FullTransitive)
        .compare_generations(curr.path(), next.path())
        .unwrap();

    assert!(report.key_incompatibilities["db.public.log"].is_empty());
    assert_eq!(report.key_schema_changed["db.public.log"], false);
    assert_eq!(report.incompatibilities_total, 0);
}

// =============================================================================
// Catalog diff
// =============================================================================

#[test]
fn test_only_common_tables_are_checked() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    let t = |name: &str| table(name, Some(key_fields()), value_fields());
    write_generation(curr.path(), &[t("A"), t("B"), t("C")]);
    write_generation(next.path(), &[t("B"), t("C"), t("D")]);

    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_generations(curr.path(), next.path())
        .unwrap();

    assert_eq!(report.removed_tables, ids(&["A"]));
    assert_eq!(report.added_tables, ids(&["D"]));
    let checked: BTreeSet<String> = report.value_schema_changed.keys().cloned().collect();
    assert_eq!(checked, ids(&["B", "C"]));
    let checked: BTreeSet<String> = report.key_incompatibilities.keys().cloned().collect();
    assert_eq!(checked, ids(&["B", "C"]));

    assert!(VerdictPolicy::new(false).evaluate(&report).is_pass());
    assert_eq!(VerdictPolicy::new(true).evaluate(&report).verdict, Verdict::Fail);
}

#[test]
fn test_missing_manifest_aborts_comparison() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    write_generation(curr.path(), &[table("A", None, value_fields())]);

    let err = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_generations(curr.path(), next.path())
        .unwrap_err();
    assert!(matches!(err, SchemaError::ManifestNotFound(_)));
}

// =============================================================================
// CI mode
// =============================================================================

#[test]
fn test_ci_passes_on_field_reorder() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    let reordered = json!([
        { "name": "name", "type": "string" },
        { "name": "id", "type": "int" }
    ]);
    write_generation(curr.path(), &[table("db.public.artist", Some(key_fields()), value_fields())]);
    write_generation(next.path(), &[table("db.public.artist", Some(key_fields()), reordered)]);

    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_generations(curr.path(), next.path())
        .unwrap();

    assert_eq!(report.incompatibilities_total, 0);
    assert!(!report.has_any_schema_changes);
    let decision = VerdictPolicy::new(true).evaluate(&report);
    assert_eq!(decision.verdict, Verdict::Pass);
    assert_eq!(decision.verdict.exit_code(), 0);
}

#[test]
fn test_ci_fails_on_compatible_type_change() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    let reordered_and_widened = json!([
        { "name": "name", "type": "string" },
        { "name": "id", "type": "long" }
    ]);
    write_generation(curr.path(), &[table("db.public.artist", Some(key_fields()), value_fields())]);
    write_generation(
        next.path(),
        &[table("db.public.artist", Some(key_fields()), reordered_and_widened)],
    );

    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .parallel(false)
        .compare_generations(curr.path(), next.path())
        .unwrap();

    assert_eq!(report.incompatibilities_total, 0);
    assert!(report.has_schema_changes_without_table_changes());
    assert_eq!(report.tables_with_changes, ids(&["db.public.artist"]));

    assert!(VerdictPolicy::new(false).evaluate(&report).is_pass());
    let decision = VerdictPolicy::new(true).evaluate(&report);
    assert_eq!(decision.verdict, Verdict::Fail);
    assert_eq!(decision.verdict.exit_code(), 1);
}

#[test]
fn test_report_json_shape() {
    let curr = tempdir().unwrap();
    let next = tempdir().unwrap();
    write_generation(curr.path(), &[table("db.public.artist", None, value_fields())]);
    write_generation(next.path(), &[table("db.public.artist", None, value_fields())]);

    let report = ComparisonEngine::new(CompatibilityLevel::Full)
        .compare_generations(curr.path(), next.path())
        .unwrap();
    let value: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    for field in [
        "current_schemas_dir",
        "next_schemas_dir",
        "compatibility_level",
        "key_incompatibilities",
        "key_incompatibilities_total",
        "value_incompatibilities",
        "value_incompatibilities_total",
        "envelope_incompatibilities",
        "envelope_incompatibilities_total",
        "incompatibilities_total",
        "removed_tables",
        "added_tables",
        "key_schema_changed",
        "value_schema_changed",
        "envelope_schema_changed",
        "tables_with_changes",
        "total_tables_with_changes",
        "has_any_schema_changes",
    ] {
        assert!(value.get(field).is_some(), "missing {}", field);
    }
    assert_eq!(value["compatibility_level"], "FULL");
}

// =============================================================================
// compare-files
// =============================================================================

#[test]
fn test_compare_files_compatible_with_changes() {
    let fixtures = fixtures_path();
    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_files(
            &fixtures.join("person-v1.avsc"),
            &fixtures.join("person-v2-compatible.avsc"),
            &[],
        )
        .unwrap();

    assert!(report.is_compatible);
    assert!(report.has_schema_changes);
    assert!(VerdictPolicy::new(false).evaluate_files(&report).is_pass());
    assert!(!VerdictPolicy::new(true).evaluate_files(&report).is_pass());
}

#[test]
fn test_compare_files_incompatible() {
    let fixtures = fixtures_path();
    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_files(
            &fixtures.join("person-v1.avsc"),
            &fixtures.join("person-v2-incompatible.avsc"),
            &[],
        )
        .unwrap();

    assert!(!report.is_compatible);
    assert!(report.incompatibilities_total > 0);
    assert_eq!(report.incompatibilities_total, report.incompatibilities.len());
    assert_eq!(VerdictPolicy::new(false).evaluate_files(&report).verdict, Verdict::Fail);

    // The new required field is readable the other way round.
    let forward = ComparisonEngine::new(CompatibilityLevel::Forward)
        .compare_files(
            &fixtures.join("person-v1.avsc"),
            &fixtures.join("person-v2-incompatible.avsc"),
            &[],
        )
        .unwrap();
    assert!(forward.is_compatible);
}

#[test]
fn test_compare_files_reorder_is_not_a_change() {
    let fixtures = fixtures_path();
    let report = ComparisonEngine::new(CompatibilityLevel::Full)
        .compare_files(
            &fixtures.join("person-v1.avsc"),
            &fixtures.join("person-v1-reordered.avsc"),
            &[],
        )
        .unwrap();

    assert!(report.is_compatible);
    assert!(!report.has_schema_changes);
    assert!(VerdictPolicy::new(true).evaluate_files(&report).is_pass());
}

#[test]
fn test_compare_files_missing_file_is_parse_error() {
    let fixtures = fixtures_path();
    let err = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_files(&fixtures.join("person-v1.avsc"), &fixtures.join("absent.avsc"), &[])
        .unwrap_err();
    assert!(matches!(err, SchemaError::Parse { .. }));
}

#[test]
fn test_include_schemas_resolve_named_types() {
    let fixtures = fixtures_path();
    let customer = fixtures.join("customer.avsc");

    assert!(SchemaFile::load_path(&customer, &[]).is_err());

    let loaded = SchemaFile::load_path(&customer, &[fixtures.join("address.avsc")]).unwrap();
    assert_eq!(loaded.identifier(), "customer");
    assert_eq!(loaded.schema().name(), Some("Customer"));
}

#[test]
fn test_included_reference_matches_inline_definition() {
    let fixtures = fixtures_path();
    let includes = [fixtures.join("address.avsc")];
    let report = ComparisonEngine::new(CompatibilityLevel::FullTransitive)
        .compare_files(
            &fixtures.join("customer.avsc"),
            &fixtures.join("customer-inline.avsc"),
            &includes,
        )
        .unwrap();

    assert!(report.is_compatible, "{:?}", report.incompatibilities);
    assert!(!report.has_schema_changes);
    assert!(VerdictPolicy::new(true).evaluate_files(&report).is_pass());
}

#[test]
fn test_included_type_gaining_required_field_breaks_backward() {
    let fixtures = fixtures_path();
    let includes = [fixtures.join("address-v2.avsc")];
    let report = ComparisonEngine::new(CompatibilityLevel::Backward)
        .compare_files(
            &fixtures.join("customer-inline.avsc"),
            &fixtures.join("customer.avsc"),
            &includes,
        )
        .unwrap();

    assert!(!report.is_compatible);
    assert!(report.has_schema_changes);
    assert_eq!(
        VerdictPolicy::new(false).evaluate_files(&report).verdict,
        Verdict::Fail
    );
}
