//! `taskhub diff`: the reconciled plan for each container, nothing written.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use taskhub_sync::{plan_sync_task, RetryPolicy};

use super::{load_settings, select_tasks};

/// Arguments for `taskhub diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Only diff this container.
    #[arg(long, value_name = "NAME")]
    pub container: Option<String>,
}

impl DiffArgs {
    pub fn run(self, config: &Path) -> Result<()> {
        let settings = load_settings(config)?;
        let tasks = select_tasks(&settings, self.container.as_deref())?;
        let (source, storage) =
            taskhub_backends::from_settings(&settings).context("failed to set up backends")?;
        let retry = RetryPolicy::from_settings(&settings.retry);

        let mut failed = 0usize;
        for task in &tasks {
            let name = task.container.as_str();
            let plan = match plan_sync_task(task, &source, &storage, &retry) {
                Ok(plan) => plan,
                Err(err) => {
                    println!("{} '{name}': {err}", "✗".red().bold());
                    failed += 1;
                    continue;
                }
            };

            if plan.plan.is_noop() {
                println!("No differences for '{name}'.");
                continue;
            }

            println!("{}", format!("== {name} ({}) ==", task.query).bold());
            for issue in &plan.plan.to_delete {
                println!("{}", format!("- {}", issue.title).red());
            }
            for issue in &plan.plan.to_create {
                println!("{}", format!("+ {}", issue.title).green());
            }
        }

        if failed > 0 {
            bail!("{failed} of {} containers could not be compared", tasks.len());
        }
        Ok(())
    }
}
