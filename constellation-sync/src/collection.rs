//! Deduplicating, merge-preserving collection of source files.
//!
//! Fold rules for an incoming entry named `n`:
//! 1. No entry `n` yet: insert it with a single-origin provenance.
//! 2. Entry `n` with the same fingerprint: append the origin, count a duplicate.
//! 3. Entry `n` with a different fingerprint: synthesize a merged artifact
//!    under `<base>-merged.<ext>` holding both contents behind provenance
//!    banners. Entry `n` is kept as-is. Occupied artifact names with other
//!    content fall through to `<base>-merged-2.<ext>`, `-3`, and so on.
//!
//! Equality is decided by fingerprint only. Nothing is ever dropped.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use constellation_core::{Fingerprint, OriginId, SourceEntry};

use crate::collect::FingerprintedEntry;

/// Marker that opens every provenance banner line.
pub const BANNER_MARKER: &str = "==== constellation merge:";

/// Whether a collected file was read from a source or synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Source,
    Merged,
}

/// One resolved file in the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub name: String,
    pub content: Vec<u8>,
    pub fingerprint: Fingerprint,
    /// Every origin that produced this exact content, in fold order.
    pub provenance: Vec<OriginId>,
    pub kind: FileKind,
}

/// Counters threaded through a fold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub entries_folded: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub merges: usize,
}

/// What happened to a single folded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    Inserted { name: String },
    Duplicate { name: String },
    Merged { name: String },
}

enum Plan {
    Insert,
    Duplicate,
    Merge {
        content: Vec<u8>,
        provenance: Vec<OriginId>,
    },
}

/// Map from file name to its retained content and provenance.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    files: BTreeMap<String, CollectedFile>,
    /// Per source name: differing fingerprints already merged this fold,
    /// and the artifact that holds each of them.
    variants: HashMap<String, Vec<(Fingerprint, String)>>,
    stats: AggregateStats,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every entry in order.
    pub fn from_entries(entries: impl IntoIterator<Item = FingerprintedEntry>) -> Self {
        let mut collection = Self::new();
        for entry in entries {
            collection.fold(entry);
        }
        collection
    }

    /// Convenience for callers holding plain entries.
    pub fn from_source_entries(entries: impl IntoIterator<Item = SourceEntry>) -> Self {
        Self::from_entries(entries.into_iter().map(|entry| FingerprintedEntry {
            fingerprint: entry.fingerprint(),
            entry,
        }))
    }

    pub fn fold(&mut self, item: FingerprintedEntry) -> FoldOutcome {
        let FingerprintedEntry { entry, fingerprint } = item;
        let name = entry.name.clone();
        self.stats.entries_folded += 1;

        let plan = match self.files.get(&name) {
            None => Plan::Insert,
            Some(existing) if existing.fingerprint == fingerprint => Plan::Duplicate,
            Some(existing) => {
                let mut provenance = existing.provenance.clone();
                push_origin(&mut provenance, &entry.origin);
                Plan::Merge {
                    content: merge_content(&name, existing, &entry),
                    provenance,
                }
            }
        };

        match plan {
            Plan::Insert => {
                tracing::debug!(name = %name, origin = %entry.origin, "collected");
                self.files.insert(
                    name.clone(),
                    CollectedFile {
                        name: name.clone(),
                        content: entry.content,
                        fingerprint,
                        provenance: vec![entry.origin],
                        kind: FileKind::Source,
                    },
                );
                self.stats.inserted += 1;
                FoldOutcome::Inserted { name }
            }
            Plan::Duplicate => {
                if let Some(existing) = self.files.get_mut(&name) {
                    push_origin(&mut existing.provenance, &entry.origin);
                }
                self.stats.duplicates += 1;
                FoldOutcome::Duplicate { name }
            }
            Plan::Merge {
                content,
                provenance,
            } => self.merge(&name, fingerprint, &entry.origin, content, provenance),
        }
    }

    fn merge(
        &mut self,
        name: &str,
        incoming: Fingerprint,
        origin: &OriginId,
        content: Vec<u8>,
        provenance: Vec<OriginId>,
    ) -> FoldOutcome {
        // The same differing variant seen again (e.g. two stars share it).
        let known = self
            .variants
            .get(name)
            .and_then(|v| v.iter().find(|(fp, _)| *fp == incoming))
            .map(|(_, artifact)| artifact.clone());
        if let Some(artifact) = known {
            if let Some(file) = self.files.get_mut(&artifact) {
                push_origin(&mut file.provenance, origin);
            }
            self.stats.duplicates += 1;
            return FoldOutcome::Duplicate { name: artifact };
        }

        let merged_fp = Fingerprint::of(&content);
        for slot in merged_names(name) {
            match self.files.get_mut(&slot) {
                None => {
                    tracing::info!(name = %name, artifact = %slot, origin = %origin, "merged differing variant");
                    self.files.insert(
                        slot.clone(),
                        CollectedFile {
                            name: slot.clone(),
                            content,
                            fingerprint: merged_fp,
                            provenance,
                            kind: FileKind::Merged,
                        },
                    );
                    self.remember_variant(name, incoming, &slot);
                    self.stats.merges += 1;
                    return FoldOutcome::Merged { name: slot };
                }
                Some(occupied) if occupied.fingerprint == merged_fp => {
                    // Artifact already present, typically deployed by an earlier run.
                    for o in &provenance {
                        push_origin(&mut occupied.provenance, o);
                    }
                    occupied.kind = FileKind::Merged;
                    self.remember_variant(name, incoming, &slot);
                    self.stats.duplicates += 1;
                    return FoldOutcome::Duplicate { name: slot };
                }
                Some(_) => continue,
            }
        }
        unreachable!("merged_names yields an unbounded sequence")
    }

    fn remember_variant(&mut self, name: &str, fingerprint: Fingerprint, artifact: &str) {
        self.variants
            .entry(name.to_string())
            .or_default()
            .push((fingerprint, artifact.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&CollectedFile> {
        self.files.get(name)
    }

    /// Resolved files, sorted by name.
    pub fn files(&self) -> impl Iterator<Item = &CollectedFile> {
        self.files.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }
}

fn push_origin(provenance: &mut Vec<OriginId>, origin: &OriginId) {
    if !provenance.contains(origin) {
        provenance.push(origin.clone());
    }
}

/// Candidate artifact names for conflicts on `name`:
/// `<base>-merged.<ext>`, then `<base>-merged-2.<ext>`, `-3`, …
pub fn merged_names(name: &str) -> impl Iterator<Item = String> + '_ {
    let path = Path::new(name);
    let (base, ext) = match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => (stem.to_string(), format!(".{ext}")),
        _ => (name.to_string(), String::new()),
    };
    (1usize..).map(move |n| {
        if n == 1 {
            format!("{base}-merged{ext}")
        } else {
            format!("{base}-merged-{n}{ext}")
        }
    })
}

/// `true` when `candidate` is `name` itself or one of its merged artifacts.
pub fn is_derived_from(candidate: &str, name: &str) -> bool {
    candidate == name || merged_names(name).take(64).any(|n| n == candidate)
}

fn merge_content(name: &str, existing: &CollectedFile, incoming: &SourceEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(existing.content.len() + incoming.content.len() + 160);
    out.extend_from_slice(banner(name, &existing.provenance).as_bytes());
    push_body(&mut out, &existing.content);
    out.extend_from_slice(banner(name, std::slice::from_ref(&incoming.origin)).as_bytes());
    push_body(&mut out, &incoming.content);
    out
}

fn push_body(out: &mut Vec<u8>, body: &[u8]) {
    out.extend_from_slice(body);
    if !body.ends_with(b"\n") {
        out.push(b'\n');
    }
}

/// One banner line identifying the origins of the content that follows.
///
/// `native` is omitted when other origins are known so a re-run that reads
/// the deployed file back as native reproduces the same bytes.
pub fn banner(name: &str, origins: &[OriginId]) -> String {
    let external: Vec<&str> = origins
        .iter()
        .filter(|o| !o.is_native())
        .map(|o| o.0.as_str())
        .collect();
    let label = if external.is_empty() {
        constellation_core::NATIVE_ORIGIN.to_string()
    } else {
        external.join(", ")
    };
    format!(
        "{} {BANNER_MARKER} {name} from {label} ====\n",
        comment_prefix(name)
    )
}

fn comment_prefix(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("js" | "mjs" | "ts" | "rs" | "go" | "c" | "h" | "cpp" | "java" | "kt" | "swift") => {
            "//"
        }
        Some("sql" | "lua" | "hs") => "--",
        _ => "#",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(origin: &str, name: &str, content: &str) -> SourceEntry {
        SourceEntry::new(origin, name, content)
    }

    fn text(file: &CollectedFile) -> String {
        String::from_utf8(file.content.clone()).unwrap()
    }

    #[test]
    fn identical_content_is_deduplicated_with_provenance() {
        let c = Collection::from_source_entries(vec![
            entry("A", "script.sh", "X"),
            entry("B", "script.sh", "X"),
            entry("C", "script.sh", "Y"),
        ]);

        let kept = c.get("script.sh").expect("script.sh");
        assert_eq!(kept.content, b"X");
        assert_eq!(kept.provenance, vec![OriginId::from("A"), OriginId::from("B")]);

        let merged = c.get("script-merged.sh").expect("merged artifact");
        let body = text(merged);
        assert!(body.contains("from A, B ===="));
        assert!(body.contains("from C ===="));
        assert!(body.contains("X\n"));
        assert!(body.contains("Y\n"));
        assert_eq!(merged.kind, FileKind::Merged);

        assert_eq!(c.stats().duplicates, 1);
        assert_eq!(c.stats().merges, 1);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn same_content_never_merges() {
        let c = Collection::from_source_entries(vec![
            entry("A", "x.py", "print(1)\n"),
            entry("B", "x.py", "print(1)\n"),
            entry("C", "x.py", "print(1)\n"),
        ]);
        assert_eq!(c.len(), 1);
        assert_eq!(c.stats().merges, 0);
        assert_eq!(c.stats().duplicates, 2);
    }

    #[test]
    fn third_differing_variant_gets_numbered_artifact() {
        let c = Collection::from_source_entries(vec![
            entry("A", "run.sh", "1"),
            entry("B", "run.sh", "2"),
            entry("C", "run.sh", "3"),
        ]);
        assert!(c.contains("run.sh"));
        assert!(c.contains("run-merged.sh"));
        assert!(c.contains("run-merged-2.sh"));
        assert!(text(c.get("run-merged-2.sh").unwrap()).contains("from C ===="));
        assert_eq!(c.stats().merges, 2);
    }

    #[test]
    fn repeated_variant_joins_existing_artifact() {
        let c = Collection::from_source_entries(vec![
            entry("A", "run.sh", "1"),
            entry("B", "run.sh", "2"),
            entry("C", "run.sh", "2"),
        ]);
        assert_eq!(c.len(), 2);
        assert_eq!(c.stats().merges, 1);
        assert_eq!(c.stats().duplicates, 1);
        let merged = c.get("run-merged.sh").unwrap();
        assert!(merged.provenance.contains(&OriginId::from("C")));
    }

    #[test]
    fn refold_of_deployed_set_is_stable() {
        let first = Collection::from_source_entries(vec![
            entry("A", "script.sh", "X"),
            entry("C", "script.sh", "Y"),
        ]);

        // Second run: deployed files are read back as native first.
        let mut second_entries: Vec<SourceEntry> = first
            .files()
            .map(|f| SourceEntry::new(OriginId::native(), f.name.clone(), f.content.clone()))
            .collect();
        second_entries.push(entry("A", "script.sh", "X"));
        second_entries.push(entry("C", "script.sh", "Y"));
        let second = Collection::from_source_entries(second_entries);

        let a: Vec<_> = first.files().map(|f| (f.name.clone(), f.content.clone())).collect();
        let b: Vec<_> = second.files().map(|f| (f.name.clone(), f.content.clone())).collect();
        assert_eq!(a, b);
        assert_eq!(second.stats().merges, 0);
    }

    #[test]
    fn merged_names_cover_extensionless_files() {
        let names: Vec<_> = merged_names("Makefile").take(2).collect();
        assert_eq!(names, vec!["Makefile-merged", "Makefile-merged-2"]);
        let names: Vec<_> = merged_names("deploy.sh").take(3).collect();
        assert_eq!(
            names,
            vec!["deploy-merged.sh", "deploy-merged-2.sh", "deploy-merged-3.sh"]
        );
        assert!(is_derived_from("deploy-merged-2.sh", "deploy.sh"));
        assert!(!is_derived_from("deploy2.sh", "deploy.sh"));
    }

    #[test]
    fn banner_uses_file_comment_syntax() {
        assert!(banner("a.ts", &[OriginId::from("A")]).starts_with("// "));
        assert!(banner("a.sql", &[OriginId::from("A")]).starts_with("-- "));
        assert!(banner("a.sh", &[OriginId::native()]).contains("from native ===="));
        assert!(banner("a.sh", &[OriginId::native(), OriginId::from("B")])
            .contains("from B ===="));
    }
}
