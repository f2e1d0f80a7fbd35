//! Artifact Store
//!
//! Durable, integrity-checked persistence of schema triads and of single
//! schema files.
//!
//! ## Layout
//!
//! ```text
//! <generation>/
//! ├── chinook.public.artist.key.avsc
//! ├── chinook.public.artist.val.avsc
//! ├── chinook.public.artist.env.avsc
//! ├── chinook.public.artist.sha256
//! └── manifest.json
//! ```
//!
//! Writes overwrite existing files unconditionally. There is no atomic rename
//! and no backup.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::schema::{StructuredSchema, SCHEMA_EXTENSION};
use crate::triad::{
    checksum_filename, validate_identifier, SchemaRole, SchemaTriad, CHECKSUM_EXTENSION,
};

/// Reads and writes schema triads in one generation directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Bind a store to a directory. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Bind a store to a directory, creating it when missing
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save a triad: one file per present schema plus the checksum sibling.
    ///
    /// A key file left over from an earlier save is removed when the triad has no key.
    pub fn save(&self, triad: &SchemaTriad) -> Result<()> {
        let identifier = triad.identifier();
        validate_identifier(identifier).map_err(SchemaError::InvalidInput)?;
        debug!("Saving schema triad: {} -> {}", identifier, self.root.display());

        for role in SchemaRole::ALL {
            let path = self.root.join(role.filename(identifier));
            match triad.schema(role) {
                Some(schema) => {
                    trace!("Saving {} schema: {} -> {}", role, identifier, path.display());
                    write_schema(&path, schema)?;
                }
                None if path.exists() => {
                    debug!("Removing stale {} schema for '{}': {}", role, identifier, path.display());
                    fs::remove_file(&path)?;
                }
                None => trace!("Skip saving {} schema: {} has none", role, identifier),
            }
        }

        let checksum_path = self.root.join(triad.checksum_filename());
        trace!("Saving checksum: {} -> {}", identifier, checksum_path.display());
        fs::write(&checksum_path, triad.checksum().as_str())?;

        Ok(())
    }

    /// Load a triad and verify it against its checksum sibling.
    ///
    /// Value and envelope files are mandatory; the key file is read only when
    /// present. A missing checksum sibling is tolerated with a warning.
    pub fn load(&self, identifier: &str) -> Result<SchemaTriad> {
        validate_identifier(identifier).map_err(SchemaError::InvalidInput)?;
        let key_path = self.root.join(SchemaRole::Key.filename(identifier));
        let key_schema = if key_path.exists() {
            Some(read_role_schema(&key_path, identifier, SchemaRole::Key)?)
        } else {
            trace!("Skip loading Key schema: {} has none", identifier);
            None
        };

        let value_schema = read_role_schema(
            &self.root.join(SchemaRole::Value.filename(identifier)),
            identifier,
            SchemaRole::Value,
        )?;
        let envelope_schema = read_role_schema(
            &self.root.join(SchemaRole::Envelope.filename(identifier)),
            identifier,
            SchemaRole::Envelope,
        )?;

        let triad = SchemaTriad::new(identifier, key_schema, value_schema, envelope_schema);
        let checksum_path = self.root.join(checksum_filename(identifier));
        verify_sibling_checksum(&checksum_path, identifier, triad.checksum())?;

        Ok(triad)
    }

    /// Whether the mandatory files of a triad exist
    pub fn contains(&self, identifier: &str) -> bool {
        [SchemaRole::Value, SchemaRole::Envelope]
            .iter()
            .all(|role| self.root.join(role.filename(identifier)).is_file())
    }
}

/// A single schema persisted as `<identifier>.avsc` with a checksum sibling.
///
/// Used for bespoke schemas that are not derived from a table, such as the
/// files compared by the file-to-file mode.
#[derive(Debug, Clone)]
pub struct SchemaFile {
    identifier: String,
    schema: StructuredSchema,
}

impl SchemaFile {
    pub fn new(identifier: impl Into<String>, schema: StructuredSchema) -> Self {
        Self {
            identifier: identifier.into(),
            schema,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn schema(&self) -> &StructuredSchema {
        &self.schema
    }

    pub fn into_schema(self) -> StructuredSchema {
        self.schema
    }

    /// File name the schema is saved with
    pub fn filename(&self) -> String {
        format!("{}.{}", self.identifier, SCHEMA_EXTENSION)
    }

    /// File name of the checksum sibling
    pub fn checksum_filename(&self) -> String {
        sibling_checksum_name(&self.filename())
    }

    pub fn checksum(&self) -> Checksum {
        self.schema.checksum()
    }

    /// Save the schema and its checksum into `dir`, returning the schema path
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.filename());
        trace!("Saving schema '{}': {}", self.identifier, path.display());
        write_schema(&path, &self.schema)?;

        let checksum_path = dir.join(self.checksum_filename());
        trace!("Saving schema '{}' checksum: {}", self.identifier, checksum_path.display());
        fs::write(&checksum_path, self.checksum().as_str())?;

        Ok(path)
    }

    /// Load `<dir>/<identifier>.avsc`, verifying its checksum sibling when present
    pub fn load_from(dir: &Path, identifier: &str) -> Result<Self> {
        let path = dir.join(format!("{}.{}", identifier, SCHEMA_EXTENSION));
        Self::load_path(&path, &[])
    }

    /// Load an arbitrary schema file.
    ///
    /// `includes` are schema files declaring named types the main file refers
    /// to; each definition is inlined where the main file first uses it. A
    /// `<file>.sha256` sibling, when present, must match the file as written.
    pub fn load_path(path: &Path, includes: &[PathBuf]) -> Result<Self> {
        let identifier = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| {
                name.strip_suffix(&format!(".{}", SCHEMA_EXTENSION))
                    .unwrap_or(name)
                    .to_string()
            })
            .ok_or_else(|| SchemaError::InvalidInput(format!("not a file path: {}", path.display())))?;

        let include_documents = includes
            .iter()
            .map(|include| {
                trace!("Loading included schema: {}", include.display());
                StructuredSchema::read_document(include)
            })
            .collect::<Result<Vec<_>>>()?;

        trace!("Loading schema '{}': {}", identifier, path.display());
        let source = StructuredSchema::read_document(path)?;
        // The sibling checksum covers the file as written, before includes are inlined
        let source_checksum = Checksum::of_str(&serde_json::to_string(&source)?);
        let schema = StructuredSchema::from_json_with_includes(source, &include_documents)
            .map_err(|e| match e {
                SchemaError::Parse { .. } => e,
                other => SchemaError::parse(path, other),
            })?;
        let file = Self::new(identifier, schema);

        let checksum_path = path.with_file_name(sibling_checksum_name(
            &path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        ));
        verify_sibling_checksum(&checksum_path, &file.identifier, &source_checksum)?;

        Ok(file)
    }
}

fn sibling_checksum_name(filename: &str) -> String {
    format!("{}.{}", filename, CHECKSUM_EXTENSION)
}

fn write_schema(path: &Path, schema: &StructuredSchema) -> Result<()> {
    let mut content = schema.to_pretty_string()?;
    content.push('\n');
    fs::write(path, content)?;
    Ok(())
}

fn read_role_schema(path: &Path, identifier: &str, role: SchemaRole) -> Result<StructuredSchema> {
    trace!("Loading {} schema: {} <- {}", role, identifier, path.display());
    let schema = StructuredSchema::read_file(path, &[])?;

    if schema.namespace() != Some(identifier) {
        warn!(
            "{} schema does not match table identifier: '{}' != '{}'",
            role,
            schema.namespace().unwrap_or("<none>"),
            identifier
        );
    }

    Ok(schema)
}

fn verify_sibling_checksum(path: &Path, identifier: &str, computed: &Checksum) -> Result<()> {
    if !path.exists() {
        warn!("Checksum for '{}' not found: skipping validation", identifier);
        return Ok(());
    }

    trace!("Loading checksum: {} <- {}", identifier, path.display());
    let persisted = Checksum::parse(&fs::read_to_string(path)?);
    if &persisted != computed {
        return Err(SchemaError::ChecksumMismatch {
            identifier: identifier.to_string(),
            path: path.to_path_buf(),
            expected: persisted.to_string(),
            actual: computed.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    const ID: &str = "db.public.album";

    fn triad(with_key: bool) -> SchemaTriad {
        let record = |name: &str| {
            json!({
                "type": "record",
                "name": name,
                "namespace": ID,
                "fields": [
                    { "name": "album_id", "type": "int" },
                    { "name": "title", "type": "string" }
                ]
            })
        };
        SchemaTriad::from_documents(
            ID,
            with_key.then(|| record("Key")),
            record("Value"),
            record("Envelope"),
        )
        .unwrap()
    }

    #[test]
    fn test_save_writes_expected_files() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&triad(true)).unwrap();

        for name in [
            "db.public.album.key.avsc",
            "db.public.album.val.avsc",
            "db.public.album.env.avsc",
            "db.public.album.sha256",
        ] {
            assert!(dir.path().join(name).is_file(), "missing {}", name);
        }
        let persisted = fs::read_to_string(dir.path().join("db.public.album.sha256")).unwrap();
        assert_eq!(persisted, triad(true).checksum().as_str());
    }

    #[test]
    fn test_round_trip_preserves_checksum() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let original = triad(true);
        store.save(&original).unwrap();

        let loaded = store.load(ID).unwrap();
        assert_eq!(loaded.checksum(), original.checksum());
        assert!(loaded.key_schema().is_some());
    }

    #[test]
    fn test_keyless_triad_omits_key_file() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&triad(true)).unwrap();
        store.save(&triad(false)).unwrap();

        assert!(!dir.path().join("db.public.album.key.avsc").exists());
        let loaded = store.load(ID).unwrap();
        assert!(loaded.key_schema().is_none());
    }

    #[test]
    fn test_tampered_schema_fails_integrity_check() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&triad(true)).unwrap();

        let value_path = dir.path().join("db.public.album.val.avsc");
        let tampered = fs::read_to_string(&value_path).unwrap().replace("title", "titlf");
        fs::write(&value_path, tampered).unwrap();

        let err = store.load(ID).unwrap_err();
        assert!(matches!(err, SchemaError::ChecksumMismatch { .. }), "got {:?}", err);
    }

    #[test]
    fn test_missing_checksum_is_tolerated() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&triad(true)).unwrap();
        fs::remove_file(dir.path().join("db.public.album.sha256")).unwrap();

        assert!(store.load(ID).is_ok());
    }

    #[test]
    fn test_missing_envelope_is_parse_error() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&triad(true)).unwrap();
        fs::remove_file(dir.path().join("db.public.album.env.avsc")).unwrap();

        assert!(!store.contains(ID));
        let err = store.load(ID).unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }), "got {:?}", err);
    }

    #[test]
    fn test_malformed_value_is_parse_error() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&triad(true)).unwrap();
        fs::write(dir.path().join("db.public.album.val.avsc"), "{ not json").unwrap();

        let err = store.load(ID).unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }), "got {:?}", err);
    }

    #[test]
    fn test_namespace_drift_is_not_fatal() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save(&triad(false)).unwrap();

        // Same files under a different identifier: namespaces no longer match.
        for suffix in ["val.avsc", "env.avsc", "sha256"] {
            fs::copy(
                dir.path().join(format!("{}.{}", ID, suffix)),
                dir.path().join(format!("db.public.renamed.{}", suffix)),
            )
            .unwrap();
        }

        let loaded = store.load("db.public.renamed").unwrap();
        assert_eq!(loaded.identifier(), "db.public.renamed");
    }

    #[test]
    fn test_schema_file_round_trip() {
        let dir = tempdir().unwrap();
        let schema = triad(false).value_schema().clone();
        let file = SchemaFile::new("album", schema);

        let path = file.save_to(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("album.avsc"));
        assert!(dir.path().join("album.avsc.sha256").is_file());

        let loaded = SchemaFile::load_from(dir.path(), "album").unwrap();
        assert_eq!(loaded.identifier(), "album");
        assert_eq!(loaded.checksum(), file.checksum());
    }

    #[test]
    fn test_schema_file_tamper_detected() {
        let dir = tempdir().unwrap();
        let file = SchemaFile::new("album", triad(false).value_schema().clone());
        let path = file.save_to(dir.path()).unwrap();

        let tampered = fs::read_to_string(&path).unwrap().replace("album_id", "album_ix");
        fs::write(&path, tampered).unwrap();

        let err = SchemaFile::load_from(dir.path(), "album").unwrap_err();
        assert!(matches!(err, SchemaError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_load_rejects_identifier_outside_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("generation");
        fs::create_dir(&root).unwrap();
        ArtifactStore::new(dir.path()).save(&triad(true)).unwrap();

        let err = ArtifactStore::new(&root).load("../db.public.album").unwrap_err();
        assert!(err.is_invalid_input());
    }
}
