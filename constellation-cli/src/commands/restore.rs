//! `constellation restore` — list, restore from, or clean up backups.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use constellation_sync::{backup, restore, RestoreOutcome};

use super::{confirmer, format_bytes, GlobalArgs};

/// Arguments for `constellation restore`.
#[derive(Args, Debug)]
#[command(args_conflicts_with_subcommands = true)]
pub struct RestoreArgs {
    #[command(subcommand)]
    pub command: Option<RestoreCommand>,

    /// Backup id to restore (see `constellation restore list`).
    pub id: Option<String>,

    /// Do not prompt for confirmation.
    #[arg(long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum RestoreCommand {
    /// List backups, newest first.
    List,

    /// Delete backups older than the retention window.
    Clean {
        /// Retention in days (defaults to `retention_days` from the config).
        days: Option<u32>,

        /// Do not prompt for confirmation.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "reason")]
    reason: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "size")]
    size: String,
}

impl RestoreArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let ws = global.load()?;
        let backups_dir = &ws.layout.backups_dir;

        match (self.command, self.id) {
            (Some(RestoreCommand::List), _) => {
                let backups = backup::list(backups_dir).context("failed to list backups")?;
                if backups.is_empty() {
                    println!("No backups yet. Run `constellation aggregate` first.");
                    return Ok(());
                }
                let rows: Vec<BackupRow> = backups
                    .iter()
                    .map(|b| BackupRow {
                        id: b.id().to_string(),
                        created: b.meta.created_at.to_rfc3339(),
                        reason: b.meta.reason.tag().unwrap_or("deploy").to_string(),
                        files: b.meta.files.len(),
                        size: format_bytes(b.total_bytes()),
                    })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
            (Some(RestoreCommand::Clean { days, yes }), _) => {
                let days = days.unwrap_or(ws.config.retention_days);
                let outcome = backup::clean(backups_dir, days, Utc::now(), confirmer(yes).as_ref())
                    .context("backup cleanup failed")?;
                if outcome.expired.is_empty() {
                    println!("No backups older than {days} day(s).");
                } else if !outcome.confirmed {
                    println!("Cleanup cancelled; {} backup(s) kept.", outcome.expired.len());
                } else {
                    for id in &outcome.removed {
                        println!("  ✗  {id}");
                    }
                    println!("✓ removed {} backup(s)", outcome.removed.len());
                }
            }
            (None, Some(id)) => {
                let outcome = restore(
                    &ws.layout,
                    &ws.config,
                    &id,
                    Utc::now(),
                    confirmer(self.yes).as_ref(),
                )
                .with_context(|| format!("restore of '{id}' failed"))?;
                match outcome {
                    RestoreOutcome::Declined { backup_id } => {
                        println!("Restore of {backup_id} cancelled; nothing changed.");
                    }
                    RestoreOutcome::Restored {
                        backup_id,
                        pre_restore,
                        report,
                        skipped,
                    } => {
                        println!(
                            "✓ restored {backup_id} ({} written, {} unchanged, {} removed)",
                            report.written(),
                            report.unchanged(),
                            report.removed()
                        );
                        println!("  previous state saved as {}", pre_restore.id());
                        for s in skipped {
                            println!(
                                "{} skipped {}: {}",
                                "!".yellow().bold(),
                                s.path.display(),
                                s.reason
                            );
                        }
                    }
                }
            }
            (None, None) => {
                anyhow::bail!("provide a backup id, `list`, or `clean`; run `constellation restore list`")
            }
        }
        Ok(())
    }
}
