//! `constellation aggregate` — collect, deduplicate, back up and deploy.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use constellation_sync::{
    run_aggregate, AggregateOptions, AggregateReport, FileKind, SyncError, WriteResult,
};

use super::GlobalArgs;

/// Arguments for `constellation aggregate`.
#[derive(Args, Debug)]
pub struct AggregateArgs {
    /// Show what would be deployed without taking a backup or writing files.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Tabled)]
struct MergedRow {
    #[tabled(rename = "artifact")]
    artifact: String,
    #[tabled(rename = "origins")]
    origins: String,
    #[tabled(rename = "fingerprint")]
    fingerprint: String,
}

impl AggregateArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let ws = global.load()?;
        let options = AggregateOptions {
            dry_run: self.dry_run,
            now: Utc::now(),
        };
        let report = run_aggregate(&ws.layout, &ws.config, &ws.candidates, options).map_err(
            |err| {
                let hint = match &err {
                    SyncError::BackupFailed { .. } => {
                        "aggregate aborted before deploying; the hub was not modified".to_string()
                    }
                    SyncError::PartialDeployment { backup, .. } => format!(
                        "aggregate failed while deploying; \
                         roll back with `constellation restore {backup}`"
                    ),
                    _ => "aggregate failed".to_string(),
                };
                anyhow::Error::new(err).context(hint)
            },
        )?;
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &AggregateReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let counts = report.counts();
    println!(
        "{prefix}✓ aggregated {} file(s) from {} source(s): {} collected, {} duplicate(s), {} merge(s)",
        counts.files_scanned,
        counts.sources_scanned,
        counts.collected,
        counts.duplicates,
        counts.merges,
    );
    println!(
        "{prefix}  {} written, {} unchanged, {} removed",
        counts.written, counts.unchanged, counts.removed
    );
    if let Some(backup) = &report.backup {
        println!("  backup: {backup}");
    }

    for result in &report.deploy.results {
        match result {
            WriteResult::Written { path } => println!("  ✎  {}", path.display()),
            WriteResult::WouldWrite { path } => println!("  ~  {}", path.display()),
            WriteResult::Removed { path } => println!("  ✗  {}", path.display()),
            WriteResult::WouldRemove { path } => println!("  -  {}", path.display()),
            WriteResult::Unchanged { .. } => {}
        }
    }

    let merged: Vec<MergedRow> = report
        .collection
        .files()
        .filter(|f| f.kind == FileKind::Merged)
        .map(|f| MergedRow {
            artifact: f.name.clone(),
            origins: f
                .provenance
                .iter()
                .map(|o| o.0.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            fingerprint: f.fingerprint.short().to_string(),
        })
        .collect();
    if !merged.is_empty() {
        let mut table = Table::new(merged);
        table.with(Style::rounded());
        println!("{table}");
    }

    for skipped in &report.skipped {
        println!(
            "{} skipped {} ({}): {}",
            "!".yellow().bold(),
            skipped.path.display(),
            skipped.origin,
            skipped.reason
        );
    }
}
