//! Checksum utilities for artifact integrity verification

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 checksum, stored as a lowercase hex digest
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn of_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Compute checksum over a sequence of parts, each followed by a newline.
    ///
    /// This is the digest used for schema triads: `key\nvalue\nenvelope\n`,
    /// with the key part skipped when absent.
    pub fn of_lines<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(b"\n");
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Compute a catalog-wide checksum: the digest of the sorted concatenation
    /// of every member checksum. Input order does not matter.
    pub fn combine<'a>(checksums: impl IntoIterator<Item = &'a Checksum>) -> Self {
        let mut sorted: Vec<&str> = checksums.into_iter().map(|c| c.as_str()).collect();
        sorted.sort_unstable();
        Self::of_str(&sorted.concat())
    }

    /// Parse a checksum as persisted on disk (surrounding whitespace ignored)
    pub fn parse(persisted: &str) -> Self {
        Self(persisted.trim().to_string())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        *self == Self::of_str(content)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
