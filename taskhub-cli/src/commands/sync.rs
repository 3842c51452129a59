//! `taskhub sync`: run every sync task once, in the foreground.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use taskhub_sync::{run_all, SyncOptions, TaskOutcome};

use super::{load_settings, select_tasks};

/// Arguments for `taskhub sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only sync this container.
    #[arg(long, value_name = "NAME")]
    pub container: Option<String>,

    /// Fetch and compare, but write nothing.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self, config: &Path) -> Result<()> {
        taskhub_daemon::init_tracing();

        let settings = load_settings(config)?;
        let tasks = select_tasks(&settings, self.container.as_deref())?;
        let (source, storage) =
            taskhub_backends::from_settings(&settings).context("failed to set up backends")?;
        let options = SyncOptions {
            dry_run: self.dry_run,
            ..SyncOptions::from_settings(&settings)
        };

        let outcomes = run_all(&tasks, &source, &storage, &options);
        for outcome in &outcomes {
            print_outcome(outcome, self.dry_run);
        }

        let failed = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();
        if failed > 0 {
            bail!("{failed} of {} sync tasks failed", outcomes.len());
        }
        Ok(())
    }
}

fn print_outcome(outcome: &TaskOutcome, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let name = outcome.task.container.as_str();

    let report = match &outcome.result {
        Ok(report) => report,
        Err(err) => {
            println!("{prefix}{} '{name}' failed: {err}", "✗".red().bold());
            return;
        }
    };

    if report.created == 0 && report.removed == 0 {
        println!(
            "{prefix}{} '{name}' up to date ({} items)",
            "✓".green().bold(),
            report.fetched
        );
        return;
    }

    let verb = if dry_run { "would sync" } else { "synced" };
    println!(
        "{prefix}{} '{name}' {verb} ({} created, {} removed)",
        "✓".green().bold(),
        report.created,
        report.removed
    );
    for title in &report.removed_titles {
        println!("  {}  {title}", "-".red());
    }
    for title in &report.created_titles {
        println!("  {}  {title}", "+".green());
    }
}
