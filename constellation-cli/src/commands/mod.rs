pub mod aggregate;
pub mod diff;
pub mod harvest_seeds;
pub mod monitor_size;
pub mod restore;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};

use constellation_core::{config, discover_with_config, Candidate, Config, Layout};
use constellation_sync::{AssumeYes, Confirm};

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory containing the hub and every star.
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Config file (defaults to `<root>/constellation.yaml` when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Resolved configuration, paths and candidate stars for one invocation.
pub struct Workspace {
    pub config: Config,
    pub layout: Layout,
    pub candidates: Vec<Candidate>,
}

impl GlobalArgs {
    pub fn load(&self) -> Result<Workspace> {
        let config = config::load_at(&self.root, self.config.as_deref())
            .context("failed to load configuration")?;
        let layout = Layout::resolve(&self.root, &config).context("failed to resolve layout")?;
        let candidates = discover_with_config(&layout.root, &config, &layout.hub_dir)
            .context("failed to discover star directories")?;
        tracing::debug!(candidates = candidates.len(), root = %layout.root.display(), "workspace loaded");
        Ok(Workspace {
            config,
            layout,
            candidates,
        })
    }
}

/// Interactive yes/no prompt; anything but an explicit yes declines.
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        match dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
        {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(error = %err, "no interactive answer; treating as no");
                false
            }
        }
    }
}

/// `AssumeYes` with `--yes`, an interactive prompt otherwise.
pub fn confirmer(yes: bool) -> Box<dyn Confirm> {
    if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(PromptConfirm)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
