//! `constellation diff` — show unified diffs for what aggregate would deploy.

use anyhow::{Context, Result};
use clap::Args;

use constellation_sync::diff::diff_target;

use super::GlobalArgs;

/// Arguments for `constellation diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let ws = global.load()?;
        let diffs = diff_target(&ws.layout, &ws.config, &ws.candidates).context("diff failed")?;

        if diffs.is_empty() {
            println!("No differences for '{}'.", ws.layout.target_dir.display());
            return Ok(());
        }

        for diff in diffs {
            if diff.unified_diff.is_empty() {
                println!("Binary file {} differs ({:?})", diff.path.display(), diff.kind);
                continue;
            }
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
