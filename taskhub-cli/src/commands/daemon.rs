//! `taskhub daemon`: foreground scheduler and its control socket.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use taskhub_daemon::paths::socket_path;
use taskhub_daemon::{call, start_blocking, ControlRequest, DaemonError, SyncSummary};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (scheduler + watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Ask the running daemon to sync now and wait for the result.
    Sync(DaemonSyncArgs),
}

#[derive(Args, Debug)]
pub struct DaemonSyncArgs {
    /// Only sync this container.
    #[arg(long, value_name = "NAME")]
    pub container: Option<String>,
}

pub fn run(command: DaemonCommand, config: &Path) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start => {
            start_blocking(config, &home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match call(&home, &ControlRequest::Stop) {
            Ok(_) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => {
            let status = match call(&home, &ControlRequest::Status) {
                Ok(status) => status,
                Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                }),
                Err(err) => return Err(err).context("failed to query daemon status"),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&status)
                    .context("failed to render daemon status JSON")?
            );
        }
        DaemonCommand::Sync(args) => {
            let request = ControlRequest::Sync {
                container: args.container,
            };
            let data = call(&home, &request).map_err(|err| match err {
                DaemonError::DaemonNotRunning { .. } => {
                    anyhow::anyhow!("daemon is not running; start it with `taskhub daemon start`")
                }
                other => anyhow::Error::new(other).context("daemon sync failed"),
            })?;
            let summary: SyncSummary =
                serde_json::from_value(data).context("unexpected daemon sync response")?;
            print_summary(&summary);
            if summary.failed > 0 {
                bail!("{} of {} sync tasks failed", summary.failed, summary.tasks.len());
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &SyncSummary) {
    for task in &summary.tasks {
        match &task.error {
            None => println!(
                "{} '{}' synced ({} created, {} removed)",
                "✓".green().bold(),
                task.container,
                task.created,
                task.removed
            ),
            Some(err) => println!("{} '{}' failed: {err}", "✗".red().bold(), task.container),
        }
    }
    println!("daemon sync of {} took {} ms", summary.target, summary.duration_ms);
}
