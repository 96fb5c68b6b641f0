//! Constellation — script aggregation for a hub-and-stars repository set.
//!
//! # Usage
//!
//! ```text
//! constellation [--root DIR] [--config FILE] [-v...] <command>
//!
//! constellation aggregate [--dry-run]
//! constellation diff
//! constellation validate [--backup ID] [--json]
//! constellation restore list
//! constellation restore <ID> [--yes]
//! constellation restore clean [DAYS] [--yes]
//! constellation monitor-size [--json]
//! constellation harvest-seeds [--dry-run]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    aggregate::AggregateArgs, diff::DiffArgs, harvest_seeds::HarvestSeedsArgs,
    monitor_size::MonitorSizeArgs, restore::RestoreArgs, validate::ValidateArgs, GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "constellation",
    version,
    about = "Collect, deduplicate and deploy scripts from star repositories into the hub",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect star scripts, merge conflicts, back up and deploy into the hub.
    Aggregate(AggregateArgs),

    /// Show unified diff of what aggregate would change in the hub.
    Diff(DiffArgs),

    /// Check deployed scripts for coverage, provenance and permissions.
    Validate(ValidateArgs),

    /// List, restore or clean up backups of the hub's scripts.
    Restore(RestoreArgs),

    /// Report disk usage per star.
    MonitorSize(MonitorSizeArgs),

    /// Merge star seed registries (glossary, tags) into the hub.
    HarvestSeeds(HarvestSeedsArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    match cli.command {
        Commands::Aggregate(args) => args.run(&cli.global),
        Commands::Diff(args) => args.run(&cli.global),
        Commands::Validate(args) => args.run(&cli.global),
        Commands::Restore(args) => args.run(&cli.global),
        Commands::MonitorSize(args) => args.run(&cli.global),
        Commands::HarvestSeeds(args) => args.run(&cli.global),
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
