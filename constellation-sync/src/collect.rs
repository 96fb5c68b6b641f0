//! Source scanning and fingerprinting.
//!
//! Sources are folded in a fixed priority order expressed as an explicit
//! list of [`SourceGroup`]s: the deployment target's own files first
//! (origin `native`), then every discovered star in discovery order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use constellation_core::{Candidate, Config, Fingerprint, Layout, OriginId, SourceEntry};

/// A directory scanned as one origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub origin: OriginId,
    pub dir: PathBuf,
}

/// An ordered set of sources sharing one priority level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGroup {
    pub label: String,
    pub sources: Vec<Source>,
}

/// A source (directory or single file) that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub origin: OriginId,
    pub path: PathBuf,
    pub reason: String,
}

/// Everything read from the source groups, in fold order.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub sources_scanned: usize,
    pub entries: Vec<SourceEntry>,
    pub skipped: Vec<SkippedSource>,
}

/// A source entry paired with its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintedEntry {
    pub entry: SourceEntry,
    pub fingerprint: Fingerprint,
}

/// Native group first, then every candidate.
pub fn source_groups(layout: &Layout, candidates: &[Candidate]) -> Vec<SourceGroup> {
    vec![
        SourceGroup {
            label: "native".to_string(),
            sources: vec![Source {
                origin: OriginId::native(),
                dir: layout.target_dir.clone(),
            }],
        },
        SourceGroup {
            label: "external".to_string(),
            sources: candidates
                .iter()
                .map(|c| Source {
                    origin: c.origin.clone(),
                    dir: c.source_dir.clone(),
                })
                .collect(),
        },
    ]
}

/// Read every group in order. Core-utility names are never sourced.
pub fn scan_groups(groups: &[SourceGroup], config: &Config) -> ScanResult {
    let mut result = ScanResult::default();
    for group in groups {
        tracing::debug!(group = %group.label, sources = group.sources.len(), "scanning group");
        for source in &group.sources {
            result.sources_scanned += 1;
            scan_dir_into(source, config, &mut result);
        }
    }
    result
}

/// Read the direct, non-hidden regular files of one directory.
///
/// A missing directory yields nothing (the target does not exist before the
/// first deployment). An unreadable directory or file is recorded in
/// `skipped` and logged; it never aborts the scan.
pub fn scan_dir(source: &Source, config: &Config) -> ScanResult {
    let mut result = ScanResult::default();
    scan_dir_into(source, config, &mut result);
    result
}

fn scan_dir_into(source: &Source, config: &Config, result: &mut ScanResult) {
    let dir = &source.dir;
    if !dir.exists() {
        tracing::debug!(path = %dir.display(), "source directory absent");
        return;
    }

    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) => {
            skip(result, source, dir, err.to_string());
            return;
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in read {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(err) => skip(result, source, dir, err.to_string()),
        }
    }
    paths.sort();

    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            skip(result, source, &path, "file name is not valid UTF-8".to_string());
            continue;
        };
        if name.starts_with('.') || config.is_exempt(&name) {
            continue;
        }
        // `metadata` follows symlinks so linked scripts are collected too.
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(err) => {
                skip(result, source, &path, err.to_string());
                continue;
            }
        }
        match std::fs::read(&path) {
            Ok(content) => result
                .entries
                .push(SourceEntry::new(source.origin.clone(), name, content)),
            Err(err) => skip(result, source, &path, err.to_string()),
        }
    }
}

fn skip(result: &mut ScanResult, source: &Source, path: &Path, reason: String) {
    tracing::warn!(origin = %source.origin, path = %path.display(), reason = %reason, "skipping unreadable source");
    result.skipped.push(SkippedSource {
        origin: source.origin.clone(),
        path: path.to_path_buf(),
        reason,
    });
}

/// Compute the fingerprint of every entry, preserving order.
pub fn fingerprint_all(entries: Vec<SourceEntry>) -> Vec<FingerprintedEntry> {
    entries
        .into_iter()
        .map(|entry| FingerprintedEntry {
            fingerprint: entry.fingerprint(),
            entry,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn source(dir: &Path, origin: &str) -> Source {
        Source {
            origin: OriginId::from(origin),
            dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn reads_direct_visible_files_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.sh"), "b").unwrap();
        fs::write(tmp.path().join("a.sh"), "a").unwrap();
        fs::write(tmp.path().join(".hidden.sh"), "h").unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("deep.sh"), "d").unwrap();

        let result = scan_dir(&source(tmp.path(), "a-model"), &Config::default());
        let names: Vec<_> = result.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.sh", "b.sh"]);
        assert!(result.skipped.is_empty());
        assert_eq!(result.entries[0].origin, OriginId::from("a-model"));
    }

    #[test]
    fn core_utilities_are_never_sourced() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("README.md"), "docs").unwrap();
        fs::write(tmp.path().join("tool.sh"), "t").unwrap();
        let result = scan_dir(&source(tmp.path(), "x-model"), &Config::default());
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].name, "tool.sh");
    }

    #[test]
    fn missing_dir_is_empty_not_skipped() {
        let tmp = TempDir::new().unwrap();
        let result = scan_dir(&source(&tmp.path().join("absent"), "native"), &Config::default());
        assert!(result.entries.is_empty());
        assert!(result.skipped.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_file_is_skipped_with_reason() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let locked = tmp.path().join("locked.sh");
        fs::write(&locked, "secret").unwrap();
        fs::write(tmp.path().join("open.sh"), "open").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything; only assert when the permission bites.
        if fs::read(&locked).is_err() {
            let result = scan_dir(&source(tmp.path(), "x-model"), &Config::default());
            assert_eq!(result.entries.len(), 1);
            assert_eq!(result.skipped.len(), 1);
            assert!(result.skipped[0].path.ends_with("locked.sh"));
        }

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[test]
    fn groups_fold_native_before_external() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("hub").join("scripts");
        let star = tmp.path().join("a-model").join("scripts");
        fs::create_dir_all(&target).unwrap();
        fs::create_dir_all(&star).unwrap();
        fs::write(target.join("z.sh"), "native").unwrap();
        fs::write(star.join("a.sh"), "star").unwrap();

        let config = Config::default();
        let layout = Layout::resolve(tmp.path(), &config).unwrap();
        let candidates = vec![Candidate {
            origin: OriginId::from("a-model"),
            star_dir: tmp.path().join("a-model"),
            source_dir: star,
        }];
        let result = scan_groups(&source_groups(&layout, &candidates), &config);
        assert_eq!(result.sources_scanned, 2);
        assert_eq!(result.entries[0].origin, OriginId::native());
        assert_eq!(result.entries[1].origin, OriginId::from("a-model"));
    }
}
