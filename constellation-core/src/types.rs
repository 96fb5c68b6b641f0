//! Domain types shared by the collector, the deployer and the CLI.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Origin label for files already present in the deployment target.
pub const NATIVE_ORIGIN: &str = "native";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifies where a piece of content came from: a star directory name,
/// [`NATIVE_ORIGIN`], or `backup:<id>` for restored files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(pub String);

impl OriginId {
    pub fn native() -> Self {
        Self(NATIVE_ORIGIN.to_owned())
    }

    pub fn backup(id: &str) -> Self {
        Self(format!("backup:{id}"))
    }

    pub fn is_native(&self) -> bool {
        self.0 == NATIVE_ORIGIN
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for OriginId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OriginId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Hex-encoded SHA-256 digest of a file's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hex::encode(hasher.finalize()))
    }

    /// First 12 hex characters, for log lines and tables.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A directory whose direct files are eligible for collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub origin: OriginId,
    /// The star's root directory.
    pub star_dir: PathBuf,
    /// The designated scripts sub-directory inside `star_dir`.
    pub source_dir: PathBuf,
}

/// One file read from a source directory. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub origin: OriginId,
    /// File name relative to the source directory (sources are never recursed).
    pub name: String,
    pub content: Vec<u8>,
}

impl SourceEntry {
    pub fn new(origin: impl Into<OriginId>, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            origin: origin.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(OriginId::from("launch-model").to_string(), "launch-model");
        assert_eq!(OriginId::native().to_string(), "native");
        assert_eq!(OriginId::backup("20260101T000000Z").to_string(), "backup:20260101T000000Z");
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        // sha256("") is a well-known constant.
        let fp = Fingerprint::of(b"");
        assert_eq!(
            fp.0,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.short(), "e3b0c44298fc");
    }

    #[test]
    fn identical_content_shares_fingerprint_regardless_of_origin() {
        let a = SourceEntry::new("a-model", "run.sh", "echo hi\n");
        let b = SourceEntry::new("b-model", "other.sh", "echo hi\n");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn origin_serializes_transparently() {
        let yaml = serde_yaml::to_string(&vec![OriginId::from("x")]).expect("serialize");
        assert_eq!(yaml.trim(), "- x");
    }
}
