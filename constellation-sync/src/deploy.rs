//! Deployment of a resolved collection into the target directory.
//!
//! ## `deploy` — ordered protocol
//!
//! 1. Require a [`Backup`] of the current target (taken by the caller).
//! 2. Remove visible target files that are neither core utilities nor part
//!    of the collection.
//! 3. For each collected file, compare the on-disk fingerprint and skip
//!    identical content (keeps mtimes stable on idempotent runs).
//! 4. Write changed content to `.<name>.constellation.tmp`, then rename.
//! 5. Set the execute bits on names with an executable extension.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use constellation_core::{Config, Fingerprint};

use crate::backup::Backup;
use crate::collection::CollectedFile;
use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome for an individual target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped — on-disk content already has the same fingerprint.
    Unchanged { path: PathBuf },
    /// File was removed because no source produces it anymore.
    Removed { path: PathBuf },
    /// `--dry-run` mode: the file *would* have been written.
    WouldWrite { path: PathBuf },
    /// `--dry-run` mode: the file *would* have been removed.
    WouldRemove { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::Removed { path }
            | WriteResult::WouldWrite { path }
            | WriteResult::WouldRemove { path } => path,
        }
    }
}

/// Every per-file outcome of one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub results: Vec<WriteResult>,
}

impl DeployReport {
    pub fn written(&self) -> usize {
        self.count(|r| matches!(r, WriteResult::Written { .. } | WriteResult::WouldWrite { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|r| matches!(r, WriteResult::Unchanged { .. }))
    }

    pub fn removed(&self) -> usize {
        self.count(|r| matches!(r, WriteResult::Removed { .. } | WriteResult::WouldRemove { .. }))
    }

    /// Files present in the target after deployment that came from the collection.
    pub fn deployed(&self) -> usize {
        self.written() + self.unchanged()
    }

    fn count(&self, f: impl Fn(&WriteResult) -> bool) -> usize {
        self.results.iter().filter(|r| f(r)).count()
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Replace the target's file set with `files`.
///
/// The `backup` argument is proof that the current target was snapshotted
/// first; it is only used for logging.
pub fn deploy<'a>(
    target_dir: &Path,
    files: impl IntoIterator<Item = &'a CollectedFile>,
    config: &Config,
    backup: &Backup,
) -> Result<DeployReport, SyncError> {
    tracing::info!(target = %target_dir.display(), backup = %backup.id(), "deploying");
    apply(target_dir, files, config, false)
}

/// Report what [`deploy`] would do without touching the filesystem.
pub fn preview<'a>(
    target_dir: &Path,
    files: impl IntoIterator<Item = &'a CollectedFile>,
    config: &Config,
) -> Result<DeployReport, SyncError> {
    apply(target_dir, files, config, true)
}

fn apply<'a>(
    target_dir: &Path,
    files: impl IntoIterator<Item = &'a CollectedFile>,
    config: &Config,
    dry_run: bool,
) -> Result<DeployReport, SyncError> {
    let files: Vec<&CollectedFile> = files
        .into_iter()
        .filter(|f| {
            let exempt = config.is_exempt(&f.name);
            if exempt {
                tracing::warn!(name = %f.name, "refusing to overwrite core utility");
            }
            !exempt
        })
        .collect();
    let wanted: BTreeSet<&str> = files.iter().map(|f| f.name.as_str()).collect();

    if !dry_run {
        std::fs::create_dir_all(target_dir).map_err(|e| io_err(target_dir, e))?;
    }

    let mut report = DeployReport::default();

    for path in removable_files(target_dir, config)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if wanted.contains(name) {
            continue;
        }
        if dry_run {
            tracing::info!("[dry-run] would remove: {}", path.display());
            report.results.push(WriteResult::WouldRemove { path });
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        tracing::info!("removed: {}", path.display());
        report.results.push(WriteResult::Removed { path });
    }

    for file in files {
        let path = target_dir.join(&file.name);
        let result = atomic_write(&path, &file.content, &file.fingerprint, dry_run)?;
        if !dry_run && config.is_executable_name(&file.name) {
            set_executable(&path)?;
        }
        report.results.push(result);
    }

    Ok(report)
}

/// Visible, non-exempt regular files directly inside `target_dir`.
fn removable_files(target_dir: &Path, config: &Config) -> Result<Vec<PathBuf>, SyncError> {
    let read = match std::fs::read_dir(target_dir) {
        Ok(read) => read,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(target_dir, err)),
    };
    let mut paths = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| io_err(target_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || config.is_exempt(&name) {
            continue;
        }
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

// ---------------------------------------------------------------------------
// atomic_write
// ---------------------------------------------------------------------------

/// Write `content` to `path` via a hidden sibling `.tmp` and a rename.
///
/// Skipped (returns `Unchanged`) when the file on disk already has
/// `fingerprint`.
pub(crate) fn atomic_write(
    path: &Path,
    content: &[u8],
    fingerprint: &Fingerprint,
    dry_run: bool,
) -> Result<WriteResult, SyncError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.constellation.tmp"));
    atomic_write_with_tmp(path, content, fingerprint, dry_run, &tmp)
}

fn atomic_write_with_tmp(
    path: &Path,
    content: &[u8],
    fingerprint: &Fingerprint,
    dry_run: bool,
    tmp: &Path,
) -> Result<WriteResult, SyncError> {
    match std::fs::read(path) {
        Ok(existing) if Fingerprint::of(&existing) == *fingerprint => {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(path, err)),
    }

    if dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), SyncError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .map_err(|e| io_err(path, e))?
        .permissions();
    let mode = perms.mode();
    if mode & 0o111 != 0o111 {
        perms.set_mode(mode | 0o755);
        std::fs::set_permissions(path, perms).map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), SyncError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{self, BackupReason};
    use crate::collection::Collection;
    use chrono::Utc;
    use constellation_core::SourceEntry;
    use std::fs;
    use tempfile::TempDir;

    fn write_bytes(path: &Path, content: &str) -> WriteResult {
        atomic_write(path, content.as_bytes(), &Fingerprint::of(content.as_bytes()), false)
            .unwrap()
    }

    fn snapshot(tmp: &TempDir, target: &Path) -> Backup {
        backup::create(
            &tmp.path().join("backups"),
            target,
            BackupReason::Deploy,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.sh");
        let result = write_bytes(&path, "hello");
        assert!(matches!(result, WriteResult::Written { .. }));
        assert!(path.exists());
    }

    #[test]
    fn same_content_returns_unchanged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("run.sh");
        write_bytes(&path, "same content");
        let result = write_bytes(&path, "same content");
        assert!(matches!(result, WriteResult::Unchanged { .. }));
    }

    #[test]
    fn dry_run_does_not_write_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.sh");
        let result = atomic_write(&path, b"content", &Fingerprint::of(b"content"), true).unwrap();
        assert!(matches!(result, WriteResult::WouldWrite { .. }));
        assert!(!path.exists(), "dry-run must not create files");
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("clean.sh");
        write_bytes(&path, "data");
        assert!(!tmp.path().join(".clean.sh.constellation.tmp").exists());
    }

    #[test]
    fn deploy_removes_stale_keeps_core_utilities_and_hidden() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("scripts");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.sh"), "old").unwrap();
        fs::write(target.join("README.md"), "core").unwrap();
        fs::write(target.join(".keep"), "").unwrap();

        let collection = Collection::from_source_entries(vec![SourceEntry::new(
            "a-model", "new.sh", "echo new\n",
        )]);
        let backup = snapshot(&tmp, &target);
        let report = deploy(&target, collection.files(), &Config::default(), &backup).unwrap();

        assert_eq!(report.removed(), 1);
        assert_eq!(report.written(), 1);
        assert!(!target.join("stale.sh").exists());
        assert_eq!(fs::read_to_string(target.join("README.md")).unwrap(), "core");
        assert!(target.join(".keep").exists());
        assert_eq!(fs::read_to_string(target.join("new.sh")).unwrap(), "echo new\n");
    }

    #[test]
    #[cfg(unix)]
    fn executable_names_get_exec_bits() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("scripts");
        let collection = Collection::from_source_entries(vec![
            SourceEntry::new("a-model", "run.sh", "echo\n"),
            SourceEntry::new("a-model", "notes.md", "text\n"),
        ]);
        let backup = snapshot(&tmp, &target);
        deploy(&target, collection.files(), &Config::default(), &backup).unwrap();

        let mode = |n: &str| fs::metadata(target.join(n)).unwrap().permissions().mode();
        assert_eq!(mode("run.sh") & 0o111, 0o111);
        assert_eq!(mode("notes.md") & 0o111, 0);
    }

    #[test]
    fn preview_reports_without_mutation() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("scripts");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.sh"), "old").unwrap();
        let collection =
            Collection::from_source_entries(vec![SourceEntry::new("a", "new.sh", "n")]);

        let report = preview(&target, collection.files(), &Config::default()).unwrap();
        assert!(report
            .results
            .iter()
            .any(|r| matches!(r, WriteResult::WouldRemove { .. })));
        assert!(report
            .results
            .iter()
            .any(|r| matches!(r, WriteResult::WouldWrite { .. })));
        assert!(target.join("stale.sh").exists());
        assert!(!target.join("new.sh").exists());
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("file.sh");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join(".file.sh.constellation.tmp");

        let result = atomic_write_with_tmp(
            &path,
            b"new content",
            &Fingerprint::of(b"new content"),
            false,
            &tmp_path,
        );

        // Root ignores directory permissions; only assert when the rename failed.
        if result.is_err() {
            let current = fs::read_to_string(&path).unwrap();
            assert_eq!(current, "original", "original file should be intact");
            assert!(!tmp_path.exists(), "tmp should be cleaned up");
        }

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();
    }
}
