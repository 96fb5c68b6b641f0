//! Read-only health check of the deployment target.
//!
//! Checks, in report order:
//! 1. Executable scripts must carry the execute bit.
//! 2. Provenance: files holding merge banners, files traced by the manifest.
//! 3. Coverage: every candidate file name is present as-is or as a merged
//!    derivative.
//! 4. Optional backup check: every top-level file recorded in a backup is
//!    present with the same fingerprint.
//!
//! Only 1, 3 and 4 affect [`ValidationReport::passed`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use constellation_core::{Candidate, Config, Fingerprint, Layout, OriginId};

use crate::backup;
use crate::collect::{self, SkippedSource, Source};
use crate::collection::{is_derived_from, BANNER_MARKER};
use crate::error::{io_err, SyncError};
use crate::manifest;

/// A candidate whose files are not all represented in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageGap {
    pub origin: OriginId,
    pub missing: Vec<String>,
}

/// A backed-up file absent from the target or present with other content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupMismatch {
    pub name: String,
    pub expected: Fingerprint,
    /// `None` when the file is missing from the target.
    pub found: Option<Fingerprint>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvenanceReport {
    /// Files containing at least one merge banner.
    pub bannered: Vec<String>,
    /// Files whose fingerprint matches the deploy manifest.
    pub traced: Vec<String>,
    /// Files the manifest does not know, or knows with other content.
    pub untraced: Vec<String>,
    pub manifest_present: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub target_files: usize,
    pub non_executable: Vec<String>,
    pub provenance: ProvenanceReport,
    pub gaps: Vec<CoverageGap>,
    pub backup: Option<String>,
    pub backup_mismatches: Vec<BackupMismatch>,
    pub skipped: Vec<SkippedSource>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.gaps.is_empty() && self.backup_mismatches.is_empty() && self.non_executable.is_empty()
    }
}

/// Validate the target against `candidates` and, optionally, backup `backup_id`.
pub fn validate(
    layout: &Layout,
    config: &Config,
    candidates: &[Candidate],
    backup_id: Option<&str>,
) -> Result<ValidationReport, SyncError> {
    let target_scan = collect::scan_dir(
        &Source {
            origin: OriginId::native(),
            dir: layout.target_dir.clone(),
        },
        config,
    );
    let target: BTreeMap<String, Fingerprint> = target_scan
        .entries
        .iter()
        .map(|e| (e.name.clone(), e.fingerprint()))
        .collect();

    let mut report = ValidationReport {
        target_files: target.len(),
        skipped: target_scan.skipped.clone(),
        ..ValidationReport::default()
    };

    for entry in &target_scan.entries {
        if config.is_executable_name(&entry.name)
            && !is_executable(&layout.target_dir.join(&entry.name))?
        {
            report.non_executable.push(entry.name.clone());
        }
        if contains(&entry.content, BANNER_MARKER.as_bytes()) {
            report.provenance.bannered.push(entry.name.clone());
        }
    }

    if let Some(manifest) = manifest::load(&layout.manifest_path)? {
        report.provenance.manifest_present = true;
        for (name, fingerprint) in &target {
            match manifest.files.get(name) {
                Some(recorded) if recorded.fingerprint == *fingerprint => {
                    report.provenance.traced.push(name.clone())
                }
                _ => report.provenance.untraced.push(name.clone()),
            }
        }
    }

    for candidate in candidates {
        let scan = collect::scan_dir(
            &Source {
                origin: candidate.origin.clone(),
                dir: candidate.source_dir.clone(),
            },
            config,
        );
        let missing: Vec<String> = scan
            .entries
            .iter()
            .map(|e| e.name.clone())
            .filter(|name| !target.keys().any(|t| is_derived_from(t, name)))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(origin = %candidate.origin, missing = missing.len(), "coverage gap");
            report.gaps.push(CoverageGap {
                origin: candidate.origin.clone(),
                missing,
            });
        }
        report.skipped.extend(scan.skipped);
    }

    if let Some(id) = backup_id {
        let chosen = backup::load(&layout.backups_dir, id)?;
        for file in &chosen.meta.files {
            if file.name.contains('/') || file.name.starts_with('.') || config.is_exempt(&file.name)
            {
                continue;
            }
            let found = target.get(&file.name).cloned();
            if found.as_ref() != Some(&file.fingerprint) {
                report.backup_mismatches.push(BackupMismatch {
                    name: file.name.clone(),
                    expected: file.fingerprint.clone(),
                    found,
                });
            }
        }
        report.backup = Some(chosen.id().to_string());
    }

    Ok(report)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> Result<bool, SyncError> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
    Ok(meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> Result<bool, SyncError> {
    std::fs::metadata(path).map_err(|e| io_err(path, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupReason;
    use chrono::Utc;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        layout: Layout,
        config: Config,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let config = Config::default();
        fs::create_dir_all(tmp.path().join(&config.hub).join(&config.scripts_dir)).unwrap();
        let layout = Layout::resolve(tmp.path(), &config).unwrap();
        Fixture {
            _tmp: tmp,
            layout,
            config,
        }
    }

    fn star(f: &Fixture, name: &str, files: &[(&str, &str)]) -> Candidate {
        let star_dir = f.layout.root.join(name);
        let source_dir = star_dir.join(&f.config.scripts_dir);
        fs::create_dir_all(&source_dir).unwrap();
        for (file, body) in files {
            fs::write(source_dir.join(file), body).unwrap();
        }
        Candidate {
            origin: OriginId::from(name),
            star_dir,
            source_dir,
        }
    }

    fn put(f: &Fixture, name: &str, body: &str) -> PathBuf {
        let path = f.layout.target_dir.join(name);
        fs::write(&path, body).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    #[test]
    fn merged_derivative_counts_as_coverage() {
        let f = fixture();
        let a = star(&f, "a-model", &[("run.sh", "1")]);
        let b = star(&f, "b-model", &[("run.sh", "2")]);
        put(&f, "run.sh", "1");
        put(&f, "run-merged.sh", "merged");

        let report = validate(&f.layout, &f.config, &[a, b], None).unwrap();
        assert!(report.gaps.is_empty());
        assert!(report.passed());
    }

    #[test]
    fn missing_candidate_file_is_a_gap() {
        let f = fixture();
        let d = star(&f, "d-model", &[("only-d.sh", "d"), ("README.md", "exempt")]);
        put(&f, "other.sh", "x");

        let report = validate(&f.layout, &f.config, &[d], None).unwrap();
        assert!(!report.passed());
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].origin, OriginId::from("d-model"));
        assert_eq!(report.gaps[0].missing, vec!["only-d.sh"]);
    }

    #[test]
    #[cfg(unix)]
    fn script_without_exec_bit_fails() {
        use std::os::unix::fs::PermissionsExt;
        let f = fixture();
        let path = put(&f, "run.sh", "x");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        fs::write(f.layout.target_dir.join("notes.md"), "n").unwrap();

        let report = validate(&f.layout, &f.config, &[], None).unwrap();
        assert_eq!(report.non_executable, vec!["run.sh"]);
        assert!(!report.passed());
    }

    #[test]
    fn backup_mismatch_detected() {
        let f = fixture();
        put(&f, "a.sh", "one");
        put(&f, "b.sh", "two");
        let snap = backup::create(
            &f.layout.backups_dir,
            &f.layout.target_dir,
            BackupReason::Deploy,
            Utc::now(),
        )
        .unwrap();
        put(&f, "a.sh", "changed");
        fs::remove_file(f.layout.target_dir.join("b.sh")).unwrap();

        let report = validate(&f.layout, &f.config, &[], Some(snap.id())).unwrap();
        let names: Vec<_> = report.backup_mismatches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a.sh", "b.sh"]);
        assert!(report.backup_mismatches[1].found.is_none());
        assert!(!report.passed());
    }

    #[test]
    fn bannered_files_are_reported() {
        let f = fixture();
        put(&f, "x-merged.sh", "# ==== constellation merge: x.sh from a ====\n1\n");
        put(&f, "y.sh", "plain");
        let report = validate(&f.layout, &f.config, &[], None).unwrap();
        assert_eq!(report.provenance.bannered, vec!["x-merged.sh"]);
        assert!(!report.provenance.manifest_present);
    }
}
