//! `constellation monitor-size` — disk usage per star.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use constellation_sync::size;

use super::{format_bytes, GlobalArgs};

/// Arguments for `constellation monitor-size`.
#[derive(Args, Debug)]
pub struct MonitorSizeArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SizeRow {
    #[tabled(rename = "star")]
    star: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "size")]
    size: String,
    #[tabled(rename = "largest file")]
    largest: String,
    #[tabled(rename = "status")]
    status: String,
}

impl MonitorSizeArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let ws = global.load()?;
        let report = size::measure(&ws.layout, &ws.config, &ws.candidates);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize size JSON")?
            );
            return Ok(());
        }

        let rows: Vec<SizeRow> = report
            .stars
            .iter()
            .map(|s| SizeRow {
                star: s.origin.0.clone(),
                files: s.files,
                size: format_bytes(s.total_bytes),
                largest: s
                    .largest
                    .as_ref()
                    .map(|l| {
                        let name = l.path.strip_prefix(&s.dir).unwrap_or(&l.path);
                        format!("{} ({})", name.display(), format_bytes(l.bytes))
                    })
                    .unwrap_or_else(|| "-".to_string()),
                status: if s.over_limit {
                    "OVER".red().bold().to_string()
                } else {
                    "ok".green().to_string()
                },
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!(
            "total {} across {} star(s); threshold {}",
            format_bytes(report.total_bytes()),
            report.stars.len(),
            format_bytes(report.warn_bytes)
        );
        let over = report.over_limit().count();
        if over > 0 {
            println!("{} {over} star(s) over the size threshold", "!".yellow().bold());
        }
        Ok(())
    }
}
