//! Unified diff preview for `constellation diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use constellation_core::{Candidate, Config, Layout};

use crate::deploy::{self, WriteResult};
use crate::error::{io_err, SyncError};
use crate::pipeline;

/// What would happen to one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Empty for binary content.
    pub unified_diff: String,
}

/// Resolve the collection exactly as `aggregate` would and compare it to the
/// current target contents.
///
/// No files are written.
pub fn diff_target(
    layout: &Layout,
    config: &Config,
    candidates: &[Candidate],
) -> Result<Vec<FileDiff>, SyncError> {
    let plan = pipeline::plan(layout, config, candidates);
    let preview = deploy::preview(&layout.target_dir, plan.collection.files(), config)?;

    let mut diffs = Vec::new();
    for result in preview.results {
        let (path, is_removal) = match result {
            WriteResult::WouldWrite { path } => (path, false),
            WriteResult::WouldRemove { path } => (path, true),
            _ => continue,
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let existing = read_existing(&path)?;
        let proposed = if is_removal {
            Vec::new()
        } else {
            plan.collection
                .get(&name)
                .map(|f| f.content.clone())
                .unwrap_or_default()
        };

        let kind = match (&existing, is_removal) {
            (_, true) => ChangeKind::Removed,
            (None, false) => ChangeKind::Added,
            (Some(_), false) => ChangeKind::Modified,
        };
        let unified_diff = unified(&name, existing.as_deref().unwrap_or_default(), &proposed);
        diffs.push(FileDiff {
            path,
            kind,
            unified_diff,
        });
    }
    Ok(diffs)
}

fn unified(name: &str, old: &[u8], new: &[u8]) -> String {
    let (Ok(old), Ok(new)) = (std::str::from_utf8(old), std::str::from_utf8(new)) else {
        return String::new();
    };
    let old = normalize_line_endings(old);
    let new = normalize_line_endings(new);
    let old_header = format!("a/{name}");
    let new_header = format!("b/{name}");
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

fn read_existing(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match std::fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
