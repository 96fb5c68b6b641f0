//! Timestamped, append-only snapshots of the deployment target.
//!
//! Each backup is a directory `<backups>/<id>/` holding:
//!
//! ```text
//! files/        copy of the target (recursive, permissions preserved)
//! backup.json   BackupMeta: id, created_at, reason, per-file fingerprints
//! ```
//!
//! Ids are `YYYYMMDDTHHMMSSZ` (UTC, second resolution), optionally followed
//! by `-<reason>` and, on a same-second collision, `-2`, `-3`, …
//! A backup is never modified after creation; it is only listed, restored
//! from, or deleted by [`clean`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use constellation_core::Fingerprint;

use crate::confirm::Confirm;
use crate::error::{io_err, SyncError};
use crate::manifest::write_json_atomic;

pub const BACKUP_META_FILE: &str = "backup.json";
pub const BACKUP_FILES_DIR: &str = "files";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const TIMESTAMP_LEN: usize = 16;

/// Why a snapshot was taken; becomes the id suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupReason {
    /// Taken by `aggregate` before deploying. No suffix.
    Deploy,
    PreRestore,
    PreScrub,
    Custom(String),
}

impl BackupReason {
    pub fn tag(&self) -> Option<&str> {
        match self {
            BackupReason::Deploy => None,
            BackupReason::PreRestore => Some("pre-restore"),
            BackupReason::PreScrub => Some("pre-scrub"),
            BackupReason::Custom(tag) => Some(tag.as_str()),
        }
    }
}

/// One file captured in a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    /// Path relative to the target directory, `/`-separated.
    pub name: String,
    pub fingerprint: Fingerprint,
    pub bytes: u64,
}

/// Contents of `backup.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub reason: BackupReason,
    pub source_dir: PathBuf,
    pub files: Vec<BackupFile>,
}

/// A backup on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub meta: BackupMeta,
}

impl Backup {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn files_dir(&self) -> PathBuf {
        self.path.join(BACKUP_FILES_DIR)
    }

    pub fn total_bytes(&self) -> u64 {
        self.meta.files.iter().map(|f| f.bytes).sum()
    }
}

/// Result of [`clean`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanOutcome {
    /// Backups older than the retention window.
    pub expired: Vec<String>,
    /// Backups actually deleted (empty when the prompt was declined).
    pub removed: Vec<String>,
    pub confirmed: bool,
}

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Base id for a snapshot taken at `now`.
pub fn backup_id(now: DateTime<Utc>, reason: &BackupReason) -> String {
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    match reason.tag() {
        Some(tag) => format!("{stamp}-{tag}"),
        None => stamp,
    }
}

/// Parse the leading timestamp of a backup id.
pub fn parse_backup_timestamp(id: &str) -> Result<DateTime<Utc>, SyncError> {
    let invalid = || SyncError::InvalidBackupId { id: id.to_string() };
    if id.contains(|c| c == '/' || c == '\\') || id.contains("..") {
        return Err(invalid());
    }
    let stamp = id.get(..TIMESTAMP_LEN).ok_or_else(invalid)?;
    let rest = &id[TIMESTAMP_LEN..];
    if !(rest.is_empty() || rest.starts_with('-')) {
        return Err(invalid());
    }
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid())
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Snapshot `source_dir` into a new backup under `backups_dir`.
///
/// A missing source directory produces an empty backup. On any failure the
/// partial backup directory is removed and [`SyncError::BackupFailed`] is
/// returned; callers must not mutate the target in that case.
pub fn create(
    backups_dir: &Path,
    source_dir: &Path,
    reason: BackupReason,
    now: DateTime<Utc>,
) -> Result<Backup, SyncError> {
    let base_id = backup_id(now, &reason);
    let (id, path) = reserve_dir(backups_dir, &base_id).map_err(|source| SyncError::BackupFailed {
        id: base_id.clone(),
        source: Box::new(source),
    })?;

    match populate(&path, source_dir, &id, reason, now) {
        Ok(meta) => {
            tracing::info!(
                id = %id,
                files = meta.files.len(),
                path = %path.display(),
                "backup created"
            );
            Ok(Backup { path, meta })
        }
        Err(source) => {
            let _ = std::fs::remove_dir_all(&path);
            Err(SyncError::BackupFailed {
                id,
                source: Box::new(source),
            })
        }
    }
}

fn reserve_dir(backups_dir: &Path, base_id: &str) -> Result<(String, PathBuf), SyncError> {
    std::fs::create_dir_all(backups_dir).map_err(|e| io_err(backups_dir, e))?;
    let mut n = 1usize;
    loop {
        let id = if n == 1 {
            base_id.to_string()
        } else {
            format!("{base_id}-{n}")
        };
        let path = backups_dir.join(&id);
        match std::fs::create_dir(&path) {
            Ok(()) => return Ok((id, path)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(err) => return Err(io_err(&path, err)),
        }
    }
}

fn populate(
    path: &Path,
    source_dir: &Path,
    id: &str,
    reason: BackupReason,
    now: DateTime<Utc>,
) -> Result<BackupMeta, SyncError> {
    let files_dir = path.join(BACKUP_FILES_DIR);
    std::fs::create_dir_all(&files_dir).map_err(|e| io_err(&files_dir, e))?;

    let mut files = Vec::new();
    if source_dir.exists() {
        for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let at = e.path().unwrap_or(source_dir).to_path_buf();
                io_err(at, std::io::Error::other(e.to_string()))
            })?;
            let relative = entry
                .path()
                .strip_prefix(source_dir)
                .unwrap_or(entry.path())
                .to_path_buf();
            let dest = files_dir.join(&relative);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&dest).map_err(|e| io_err(&dest, e))?;
                continue;
            }
            // Links to directories, and dangling links, are kept as links.
            if entry.path_is_symlink()
                && !std::fs::metadata(entry.path()).is_ok_and(|m| m.is_file())
            {
                copy_link(entry.path(), &dest)?;
                continue;
            }

            let bytes = std::fs::read(entry.path()).map_err(|e| io_err(entry.path(), e))?;
            std::fs::write(&dest, &bytes).map_err(|e| io_err(&dest, e))?;
            let perms = std::fs::metadata(entry.path())
                .map_err(|e| io_err(entry.path(), e))?
                .permissions();
            std::fs::set_permissions(&dest, perms).map_err(|e| io_err(&dest, e))?;

            files.push(BackupFile {
                name: relative_name(&relative),
                fingerprint: Fingerprint::of(&bytes),
                bytes: bytes.len() as u64,
            });
        }
    }

    let meta = BackupMeta {
        id: id.to_string(),
        created_at: now,
        reason,
        source_dir: source_dir.to_path_buf(),
        files,
    };
    write_json_atomic(&path.join(BACKUP_META_FILE), &meta)?;
    Ok(meta)
}

#[cfg(unix)]
fn copy_link(link: &Path, dest: &Path) -> Result<(), SyncError> {
    let points_to = std::fs::read_link(link).map_err(|e| io_err(link, e))?;
    std::os::unix::fs::symlink(&points_to, dest).map_err(|e| io_err(dest, e))?;
    tracing::debug!(link = %link.display(), to = %points_to.display(), "backed up symlink");
    Ok(())
}

#[cfg(not(unix))]
fn copy_link(link: &Path, _dest: &Path) -> Result<(), SyncError> {
    tracing::warn!(link = %link.display(), "skipping symlink that is not a file");
    Ok(())
}

fn relative_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// List / load
// ---------------------------------------------------------------------------

/// Every readable backup, newest first.
///
/// Directories without a valid id or a readable `backup.json` are skipped
/// with a warning.
pub fn list(backups_dir: &Path) -> Result<Vec<Backup>, SyncError> {
    if !backups_dir.exists() {
        return Ok(vec![]);
    }
    let mut backups = Vec::new();
    for entry in std::fs::read_dir(backups_dir).map_err(|e| io_err(backups_dir, e))? {
        let entry = entry.map_err(|e| io_err(backups_dir, e))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if parse_backup_timestamp(&name).is_err() {
            continue;
        }
        match read_meta(&entry.path()) {
            Ok(meta) => backups.push(Backup {
                path: entry.path(),
                meta,
            }),
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "skipping unreadable backup");
            }
        }
    }
    backups.sort_by(|a, b| {
        b.meta
            .created_at
            .cmp(&a.meta.created_at)
            .then_with(|| b.meta.id.cmp(&a.meta.id))
    });
    Ok(backups)
}

/// Load one backup by id.
pub fn load(backups_dir: &Path, id: &str) -> Result<Backup, SyncError> {
    parse_backup_timestamp(id)?;
    let path = backups_dir.join(id);
    if !path.is_dir() {
        return Err(SyncError::BackupNotFound { id: id.to_string() });
    }
    let meta = read_meta(&path)?;
    Ok(Backup { path, meta })
}

fn read_meta(path: &Path) -> Result<BackupMeta, SyncError> {
    let meta_path = path.join(BACKUP_META_FILE);
    let contents = std::fs::read_to_string(&meta_path).map_err(|e| io_err(&meta_path, e))?;
    Ok(serde_json::from_str(&contents)?)
}

// ---------------------------------------------------------------------------
// Clean
// ---------------------------------------------------------------------------

/// Delete backups whose timestamp is older than `retention_days` before `now`.
///
/// Nothing is deleted unless `confirm` answers yes.
pub fn clean(
    backups_dir: &Path,
    retention_days: u32,
    now: DateTime<Utc>,
    confirm: &dyn Confirm,
) -> Result<CleanOutcome, SyncError> {
    let Some(cutoff) = Duration::try_days(i64::from(retention_days))
        .and_then(|window| now.checked_sub_signed(window))
    else {
        tracing::debug!(retention_days, "retention window reaches past the earliest date");
        return Ok(CleanOutcome::default());
    };
    let expired: Vec<Backup> = list(backups_dir)?
        .into_iter()
        .filter(|b| b.meta.created_at < cutoff)
        .collect();

    let mut outcome = CleanOutcome {
        expired: expired.iter().map(|b| b.meta.id.clone()).collect(),
        ..CleanOutcome::default()
    };
    if expired.is_empty() {
        return Ok(outcome);
    }

    let prompt = format!(
        "Delete {} backup(s) older than {retention_days} day(s)?",
        expired.len()
    );
    if !confirm.confirm(&prompt) {
        tracing::info!(expired = expired.len(), "backup cleanup declined");
        return Ok(outcome);
    }
    outcome.confirmed = true;

    for backup in expired {
        std::fs::remove_dir_all(&backup.path).map_err(|e| io_err(&backup.path, e))?;
        tracing::info!(id = %backup.meta.id, "backup deleted");
        outcome.removed.push(backup.meta.id);
    }
    Ok(outcome)
}
