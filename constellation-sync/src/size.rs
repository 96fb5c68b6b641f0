//! Disk usage report per star.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use constellation_core::{Candidate, Config, Layout, OriginId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LargestFile {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StarSize {
    pub origin: OriginId,
    pub dir: PathBuf,
    pub total_bytes: u64,
    pub files: usize,
    pub largest: Option<LargestFile>,
    /// `total_bytes` exceeds the configured warning threshold.
    pub over_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    pub warn_bytes: u64,
    pub stars: Vec<StarSize>,
}

impl SizeReport {
    pub fn total_bytes(&self) -> u64 {
        self.stars.iter().map(|s| s.total_bytes).sum()
    }

    pub fn over_limit(&self) -> impl Iterator<Item = &StarSize> {
        self.stars.iter().filter(|s| s.over_limit)
    }
}

/// Measure every candidate star and the hub. `.git` directories and the
/// hub's state directory are not counted.
pub fn measure(layout: &Layout, config: &Config, candidates: &[Candidate]) -> SizeReport {
    let mut stars: Vec<StarSize> = candidates
        .iter()
        .map(|c| measure_dir(c.origin.clone(), &c.star_dir, None, config.size_warn_bytes))
        .collect();
    stars.push(measure_dir(
        OriginId::from(config.hub.as_str()),
        &layout.hub_dir,
        Some(&layout.state_dir),
        config.size_warn_bytes,
    ));
    SizeReport {
        warn_bytes: config.size_warn_bytes,
        stars,
    }
}

fn measure_dir(origin: OriginId, dir: &Path, skip: Option<&Path>, warn_bytes: u64) -> StarSize {
    let mut total_bytes = 0u64;
    let mut files = 0usize;
    let mut largest: Option<LargestFile> = None;

    let walker = WalkDir::new(dir).into_iter().filter_entry(|e| {
        e.file_name() != ".git" && skip.map_or(true, |s| e.path() != s)
    });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let bytes = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                tracing::warn!(path = %entry.path().display(), error = %err, "skipping unreadable file");
                continue;
            }
        };
        total_bytes += bytes;
        files += 1;
        if largest.as_ref().map_or(true, |l| bytes > l.bytes) {
            largest = Some(LargestFile {
                path: entry.path().to_path_buf(),
                bytes,
            });
        }
    }

    let over_limit = total_bytes > warn_bytes;
    if over_limit {
        tracing::warn!(origin = %origin, total_bytes, warn_bytes, "star exceeds size threshold");
    }
    StarSize {
        origin,
        dir: dir.to_path_buf(),
        total_bytes,
        files,
        largest,
        over_limit,
    }
}
