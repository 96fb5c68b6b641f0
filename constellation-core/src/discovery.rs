//! Candidate discovery.
//!
//! Lists the direct children of the constellation root, keeps the ones the
//! predicate accepts, and drops the hub (whose scripts directory is the
//! deployment target). Results are sorted by directory name so every run
//! folds sources in the same order.

use std::path::Path;

use crate::config::Config;
use crate::error::{io_err, ConfigError};
use crate::types::{Candidate, OriginId};

/// Decides whether a directory under the root is a star.
///
/// Implementations must be deterministic.
pub trait CandidatePredicate {
    fn accepts(&self, dir: &Path) -> bool;
}

impl<F> CandidatePredicate for F
where
    F: Fn(&Path) -> bool,
{
    fn accepts(&self, dir: &Path) -> bool {
        self(dir)
    }
}

/// The module-suffix naming convention: `<name><suffix>/` containing `<scripts_dir>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConvention {
    pub suffix: String,
    pub scripts_dir: String,
}

impl ModuleConvention {
    pub fn from_config(config: &Config) -> Self {
        Self {
            suffix: config.module_suffix.clone(),
            scripts_dir: config.scripts_dir.clone(),
        }
    }
}

impl CandidatePredicate for ModuleConvention {
    fn accepts(&self, dir: &Path) -> bool {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.ends_with(&self.suffix) && dir.join(&self.scripts_dir).is_dir()
    }
}

/// Discover candidate source directories under `root`.
///
/// `exclude` is the hub directory; it never appears in the result even if it
/// matches the predicate. Hidden directories are skipped. A missing root is a
/// fatal [`ConfigError::RootNotFound`]; an entry that cannot be inspected is
/// skipped with a warning.
pub fn discover(
    root: &Path,
    predicate: &dyn CandidatePredicate,
    scripts_dir: &str,
    exclude: &Path,
) -> Result<Vec<Candidate>, ConfigError> {
    if !root.is_dir() {
        return Err(ConfigError::RootNotFound {
            path: root.to_path_buf(),
        });
    }

    let exclude = canonical_or_self(exclude);
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(root).map_err(|e| io_err(root, e))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        match entry.file_type() {
            Ok(t) if t.is_dir() => {}
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "skipping candidate");
                continue;
            }
        }
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.file_name());

    let mut candidates = Vec::new();
    for entry in entries {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 directory name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let dir = entry.path();
        if canonical_or_self(&dir) == exclude {
            continue;
        }
        if !predicate.accepts(&dir) {
            continue;
        }
        let source_dir = dir.join(scripts_dir);
        if let Err(err) = std::fs::read_dir(&source_dir) {
            tracing::warn!(path = %source_dir.display(), error = %err, "skipping unreadable candidate");
            continue;
        }
        candidates.push(Candidate {
            origin: OriginId::from(name),
            star_dir: dir,
            source_dir,
        });
    }
    Ok(candidates)
}

/// Discover candidates using the configured module convention.
pub fn discover_with_config(
    root: &Path,
    config: &Config,
    hub_dir: &Path,
) -> Result<Vec<Candidate>, ConfigError> {
    discover(
        root,
        &ModuleConvention::from_config(config),
        &config.scripts_dir,
        hub_dir,
    )
}

fn canonical_or_self(path: &Path) -> std::path::PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
