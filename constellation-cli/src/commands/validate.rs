//! `constellation validate` — coverage, provenance and permission checks.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use constellation_sync::{validate, ValidationReport};

use super::GlobalArgs;

/// Arguments for `constellation validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also require every file of this backup to be present unchanged.
    #[arg(long, value_name = "ID")]
    pub backup: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct GapRow {
    #[tabled(rename = "origin")]
    origin: String,
    #[tabled(rename = "missing files")]
    missing: String,
}

impl ValidateArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let ws = global.load()?;
        let report = validate(
            &ws.layout,
            &ws.config,
            &ws.candidates,
            self.backup.as_deref(),
        )
        .context("validation could not run; check `constellation restore list` for backup ids")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize validation JSON")?
            );
        } else {
            print_report(&report);
        }

        if !report.passed() {
            bail!(
                "validation failed: {} coverage gap(s), {} backup mismatch(es), {} non-executable script(s)",
                report.gaps.len(),
                report.backup_mismatches.len(),
                report.non_executable.len()
            );
        }
        Ok(())
    }
}

fn print_report(report: &ValidationReport) {
    let provenance = &report.provenance;
    println!("{} file(s) in target", report.target_files);
    println!(
        "  {} with merge banners, {} traced by manifest, {} untraced",
        provenance.bannered.len(),
        provenance.traced.len(),
        provenance.untraced.len()
    );
    if !provenance.manifest_present {
        println!("  no deploy manifest yet; run `constellation aggregate`");
    }
    for name in &provenance.untraced {
        println!("  ?  {name}");
    }

    for name in &report.non_executable {
        println!("{} {name} is not executable", "✗".red().bold());
    }

    if !report.gaps.is_empty() {
        let rows: Vec<GapRow> = report
            .gaps
            .iter()
            .map(|gap| GapRow {
                origin: gap.origin.0.clone(),
                missing: gap.missing.join(", "),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{}", "Coverage gaps".red().bold());
        println!("{table}");
    }

    if let Some(id) = &report.backup {
        if report.backup_mismatches.is_empty() {
            println!("{} matches backup {id}", "✓".green().bold());
        }
        for mismatch in &report.backup_mismatches {
            let found = mismatch
                .found
                .as_ref()
                .map(|f| f.short().to_string())
                .unwrap_or_else(|| "missing".to_string());
            println!(
                "{} {} differs from backup {id}: expected {}, found {found}",
                "✗".red().bold(),
                mismatch.name,
                mismatch.expected.short()
            );
        }
    }

    for skipped in &report.skipped {
        println!(
            "{} skipped {}: {}",
            "!".yellow().bold(),
            skipped.path.display(),
            skipped.reason
        );
    }

    if report.passed() {
        println!("{} validation passed", "✓".green().bold());
    }
}
