//! Aggregate pipeline shared by `constellation aggregate` and `diff`.
//!
//! Phases advance strictly in order:
//!
//! ```text
//! Idle → Scanning → Fingerprinting → Deduplicating → BackingUp → Deploying → Done
//!                                         │               └──→ Aborted (backup failed)
//!                                         └──→ Done (dry run)
//! any non-terminal phase ──→ Failed (unexpected I/O error)
//! ```
//!
//! The deployment target is not touched before `Deploying`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use constellation_core::{Candidate, Config, Layout};

use crate::backup::{self, BackupReason};
use crate::collect::{self, ScanResult, SkippedSource};
use crate::collection::{AggregateStats, Collection};
use crate::deploy::{self, DeployReport};
use crate::error::{partial_deployment, SyncError};
use crate::manifest::{self, DeployManifest};
use crate::status::{self, StatusCounts, StatusRecord};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Scanning,
    Fingerprinting,
    Deduplicating,
    BackingUp,
    Deploying,
    Done,
    Aborted,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted | Phase::Failed)
    }

    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, Fingerprinting)
                | (Fingerprinting, Deduplicating)
                | (Deduplicating, BackingUp)
                | (Deduplicating, Done)
                | (BackingUp, Deploying)
                | (BackingUp, Aborted)
                | (Deploying, Done)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Scanning => "scanning",
            Phase::Fingerprinting => "fingerprinting",
            Phase::Deduplicating => "deduplicating",
            Phase::BackingUp => "backing_up",
            Phase::Deploying => "deploying",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Run {
    phase: Phase,
}

impl Run {
    fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        tracing::debug!(from = %self.phase, to = %next, "phase");
        self.phase = next;
    }

    /// Record a failure for `result` and pass it through.
    fn guard<T>(&mut self, result: Result<T, SyncError>) -> Result<T, SyncError> {
        if let Err(err) = &result {
            let next = match err {
                SyncError::BackupFailed { .. } if self.phase == Phase::BackingUp => Phase::Aborted,
                _ => Phase::Failed,
            };
            tracing::error!(phase = %self.phase, error = %err, "aggregate {next}");
            self.advance(next);
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything `aggregate` computes before touching the target.
#[derive(Debug, Clone)]
pub struct Plan {
    pub scan: ScanResult,
    pub collection: Collection,
}

/// Scan every source group and fold the result into a [`Collection`].
pub fn plan(layout: &Layout, config: &Config, candidates: &[Candidate]) -> Plan {
    let mut run = Run::new();
    plan_with(&mut run, layout, config, candidates)
}

fn plan_with(run: &mut Run, layout: &Layout, config: &Config, candidates: &[Candidate]) -> Plan {
    run.advance(Phase::Scanning);
    let groups = collect::source_groups(layout, candidates);
    let scan = collect::scan_groups(&groups, config);

    run.advance(Phase::Fingerprinting);
    let entries = collect::fingerprint_all(scan.entries.clone());

    run.advance(Phase::Deduplicating);
    let collection = Collection::from_entries(entries);

    Plan { scan, collection }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub dry_run: bool,
    pub now: DateTime<Utc>,
}

/// Outcome of one [`run_aggregate`] call.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub run_id: String,
    pub phase: Phase,
    pub dry_run: bool,
    pub sources_scanned: usize,
    pub files_scanned: usize,
    pub stats: AggregateStats,
    pub collection: Collection,
    pub deploy: DeployReport,
    pub backup: Option<String>,
    pub skipped: Vec<SkippedSource>,
}

impl AggregateReport {
    pub fn counts(&self) -> StatusCounts {
        StatusCounts {
            sources_scanned: self.sources_scanned,
            files_scanned: self.files_scanned,
            collected: self.collection.len(),
            deployed: self.deploy.deployed(),
            written: self.deploy.written(),
            unchanged: self.deploy.unchanged(),
            removed: self.deploy.removed(),
            duplicates: self.stats.duplicates,
            merges: self.stats.merges,
        }
    }
}

/// Collect, deduplicate, back up and deploy; then write manifest and status.
///
/// With `dry_run` no backup is taken and nothing is written; the report
/// carries `WouldWrite` / `WouldRemove` results.
pub fn run_aggregate(
    layout: &Layout,
    config: &Config,
    candidates: &[Candidate],
    options: AggregateOptions,
) -> Result<AggregateReport, SyncError> {
    let mut run = Run::new();
    let Plan { scan, collection } = plan_with(&mut run, layout, config, candidates);
    tracing::info!(
        sources = scan.sources_scanned,
        files = scan.entries.len(),
        collected = collection.len(),
        merges = collection.stats().merges,
        "collection resolved"
    );

    let mut report = AggregateReport {
        run_id: backup::backup_id(options.now, &BackupReason::Deploy),
        phase: run.phase,
        dry_run: options.dry_run,
        sources_scanned: scan.sources_scanned,
        files_scanned: scan.entries.len(),
        stats: collection.stats(),
        deploy: DeployReport::default(),
        backup: None,
        skipped: scan.skipped,
        collection,
    };

    if options.dry_run {
        report.deploy = run.guard(deploy::preview(
            &layout.target_dir,
            report.collection.files(),
            config,
        ))?;
        run.advance(Phase::Done);
        report.phase = run.phase;
        return Ok(report);
    }

    run.advance(Phase::BackingUp);
    let snapshot = run.guard(backup::create(
        &layout.backups_dir,
        &layout.target_dir,
        BackupReason::Deploy,
        options.now,
    ))?;
    report.run_id = snapshot.id().to_string();
    report.backup = Some(snapshot.id().to_string());

    run.advance(Phase::Deploying);
    report.deploy = run.guard(
        deploy::deploy(
            &layout.target_dir,
            report.collection.files(),
            config,
            &snapshot,
        )
        .map_err(partial_deployment(snapshot.id())),
    )?;
    run.guard(
        manifest::save(
            &layout.manifest_path,
            &DeployManifest::from_files(report.collection.files(), snapshot.id(), options.now),
        )
        .map_err(partial_deployment(snapshot.id())),
    )?;

    run.advance(Phase::Done);
    report.phase = run.phase;

    let record = StatusRecord {
        id: config.hub.clone(),
        run_id: report.run_id.clone(),
        timestamp: options.now,
        state: report.phase.to_string(),
        counts: report.counts(),
        backup: report.backup.clone(),
        skipped: report.skipped.clone(),
    };
    status::write(&layout.status_path, &record)?;

    Ok(report)
}
