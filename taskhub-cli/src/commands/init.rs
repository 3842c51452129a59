//! `taskhub init [--force]`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use taskhub_core::settings;

/// Write a starter settings file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing settings file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, config: &Path) -> Result<()> {
        let written = settings::init_file(config, self.force)
            .with_context(|| format!("failed to write {}", config.display()))?;

        if written {
            println!("✓ Wrote starter settings to {}", config.display());
            println!("  Fill in the source token and storage, then run `taskhub lists`.");
        } else {
            println!(
                "Settings already exist at {} (use --force to overwrite).",
                config.display()
            );
        }
        Ok(())
    }
}
