//! Deploy manifest — fingerprint and provenance of every deployed file.
//!
//! Persists a `DeployManifest` JSON document at `<hub>/<state_dir>/manifest.json`.
//! Writes use an atomic `.tmp` + rename.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use constellation_core::{Fingerprint, OriginId};

use crate::collection::{CollectedFile, FileKind};
use crate::error::{io_err, SyncError};

/// Per-file record in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub fingerprint: Fingerprint,
    pub provenance: Vec<OriginId>,
    pub kind: FileKind,
}

/// On-disk manifest payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployManifest {
    pub deployed_at: DateTime<Utc>,
    /// Backup taken immediately before this deployment.
    pub backup: String,
    pub files: BTreeMap<String, ManifestEntry>,
}

impl DeployManifest {
    /// Record for the files just deployed after `backup_id` was taken.
    pub fn from_files<'a>(
        files: impl IntoIterator<Item = &'a CollectedFile>,
        backup_id: &str,
        deployed_at: DateTime<Utc>,
    ) -> Self {
        let files = files
            .into_iter()
            .map(|f| {
                (
                    f.name.clone(),
                    ManifestEntry {
                        fingerprint: f.fingerprint.clone(),
                        provenance: f.provenance.clone(),
                        kind: f.kind,
                    },
                )
            })
            .collect();
        Self {
            deployed_at,
            backup: backup_id.to_string(),
            files,
        }
    }

    /// Every origin referenced by any deployed file.
    pub fn origins(&self) -> impl Iterator<Item = &OriginId> {
        self.files.values().flat_map(|e| e.provenance.iter())
    }
}

/// Load the manifest at `path`. Returns `None` if no deployment has happened yet.
pub fn load(path: &Path) -> Result<Option<DeployManifest>, SyncError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save the manifest atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save(path: &Path, manifest: &DeployManifest) -> Result<(), SyncError> {
    write_json_atomic(path, manifest)
}

/// Serialize `value` as pretty JSON and write it via `.tmp` + rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, format!("{json}\n").as_bytes())
}

/// Write `bytes` to `<path>.tmp`, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("path has no parent directory"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> DeployManifest {
        let mut files = BTreeMap::new();
        files.insert(
            "run.sh".to_string(),
            ManifestEntry {
                fingerprint: Fingerprint::of(b"echo"),
                provenance: vec![OriginId::from("a-model"), OriginId::from("b-model")],
                kind: FileKind::Source,
            },
        );
        DeployManifest {
            deployed_at: Utc::now(),
            backup: "20260101T000000Z".to_string(),
            files,
        }
    }

    #[test]
    fn missing_manifest_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load(&tmp.path().join("manifest.json")).unwrap().is_none());
    }

    #[test]
    fn save_then_load_preserves_provenance() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("manifest.json");
        let manifest = sample();
        save(&path, &manifest).unwrap();
        let loaded = load(&path).unwrap().expect("manifest");
        assert_eq!(loaded.files, manifest.files);
        let origins: Vec<_> = loaded.origins().map(|o| o.0.as_str()).collect();
        assert_eq!(origins, vec!["a-model", "b-model"]);
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.json");
        save(&path, &sample()).unwrap();
        assert!(
            !tmp.path().join("manifest.json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }
}
