//! Seed registry harvesting.
//!
//! Each star keeps YAML registries (glossary, tags) under `<star>/seeds/`.
//! Harvesting concatenates them in star order into one de-duplicated list
//! per file under the hub's seeds output directory.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use constellation_core::{Candidate, Config, Layout, OriginId};

use crate::collect::SkippedSource;
use crate::error::SyncError;
use crate::manifest::write_atomic;

/// Per seed file outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedFileReport {
    pub file: String,
    /// Stars that provided this file.
    pub sources: Vec<OriginId>,
    pub records: usize,
    pub duplicates: usize,
    pub output: PathBuf,
    pub written: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub files: Vec<SeedFileReport>,
    pub skipped: Vec<SkippedSource>,
}

/// Harvest every configured seed file from `candidates`.
///
/// Files no star provides are not written. With `dry_run` nothing is written.
pub fn harvest(
    layout: &Layout,
    config: &Config,
    candidates: &[Candidate],
    dry_run: bool,
) -> Result<HarvestReport, SyncError> {
    let mut report = HarvestReport::default();

    for file in &config.seeds.files {
        let mut records = Vec::new();
        let mut sources = Vec::new();
        for candidate in candidates {
            let path = candidate.star_dir.join(&config.seeds.dir).join(file);
            if !path.is_file() {
                continue;
            }
            let doc = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| {
                    serde_yaml::from_str::<Value>(&text).map_err(|e| e.to_string())
                });
            match doc {
                Ok(doc) => {
                    records.extend(normalize(doc));
                    sources.push(candidate.origin.clone());
                }
                Err(reason) => {
                    tracing::warn!(path = %path.display(), reason = %reason, "skipping seed file");
                    report.skipped.push(SkippedSource {
                        origin: candidate.origin.clone(),
                        path,
                        reason,
                    });
                }
            }
        }

        let output = layout.seeds_output_dir.join(file);
        if sources.is_empty() {
            tracing::debug!(file = %file, "no star provides seed file");
            continue;
        }

        let total = records.len();
        let records = dedupe(records);
        let duplicates = total - records.len();

        let written = if dry_run {
            tracing::info!("[dry-run] would write: {}", output.display());
            false
        } else {
            let yaml = serde_yaml::to_string(&records)?;
            write_atomic(&output, yaml.as_bytes())?;
            tracing::info!(records = records.len(), duplicates, "wrote: {}", output.display());
            true
        };

        report.files.push(SeedFileReport {
            file: file.clone(),
            sources,
            records: records.len(),
            duplicates,
            output,
            written,
        });
    }

    Ok(report)
}

/// Turn one YAML document into a flat list of records.
pub fn normalize(doc: Value) -> Vec<Value> {
    match doc {
        Value::Null => vec![],
        Value::Sequence(items) => items.into_iter().map(as_record).collect(),
        Value::Mapping(map) => map
            .into_iter()
            .map(|(key, value)| match value {
                Value::Mapping(mut inner) => {
                    // An explicit `key` field wins over the mapping key.
                    if !inner.contains_key("key") {
                        inner.insert(Value::from("key"), key);
                    }
                    Value::Mapping(inner)
                }
                other => {
                    let mut record = Mapping::new();
                    record.insert(Value::from("key"), key);
                    record.insert(Value::from("value"), other);
                    Value::Mapping(record)
                }
            })
            .collect(),
        Value::Tagged(tagged) => normalize(tagged.value),
        scalar => vec![as_record(scalar)],
    }
}

fn as_record(item: Value) -> Value {
    match item {
        Value::Mapping(_) => item,
        other => {
            let mut record = Mapping::new();
            record.insert(Value::from("value"), other);
            Value::Mapping(record)
        }
    }
}

/// Keep the first record per identity, preserving order.
///
/// Identity is the `key` field when it is a non-empty string, otherwise the
/// canonical (sorted-key) JSON rendering of the whole record.
pub fn dedupe(records: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(identity(record)))
        .collect()
}

fn identity(record: &Value) -> String {
    if let Some(key) = record.get("key").and_then(Value::as_str) {
        if !key.is_empty() {
            return format!("key:{key}");
        }
    }
    match serde_json::to_value(record) {
        Ok(json) => format!("json:{json}"),
        Err(_) => format!("yaml:{}", serde_yaml::to_string(record).unwrap_or_default()),
    }
}
