//! `constellation harvest-seeds` — merge star seed registries into the hub.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use constellation_sync::seeds;

use super::GlobalArgs;

/// Arguments for `constellation harvest-seeds`.
#[derive(Args, Debug)]
pub struct HarvestSeedsArgs {
    /// Report what would be written without writing seed files.
    #[arg(long)]
    pub dry_run: bool,
}

impl HarvestSeedsArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let ws = global.load()?;
        let report = seeds::harvest(&ws.layout, &ws.config, &ws.candidates, self.dry_run)
            .context("seed harvest failed")?;

        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        if report.files.is_empty() {
            println!("{prefix}No seed files found in any star.");
        }
        for file in &report.files {
            println!(
                "{prefix}✓ {} — {} record(s) from {} star(s), {} duplicate(s) dropped",
                file.file,
                file.records,
                file.sources.len(),
                file.duplicates
            );
            if file.written {
                println!("  ✎  {}", file.output.display());
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
        Ok(())
    }
}
