//! taskhub: mirror issue-tracker searches into to-do lists.
//!
//! # Usage
//!
//! ```text
//! taskhub [--config <path>] init [--force]
//! taskhub [--config <path>] lists
//! taskhub [--config <path>] sync [--container <name>] [--dry-run]
//! taskhub [--config <path>] diff [--container <name>]
//! taskhub [--config <path>] daemon start|stop|status|sync [--container <name>]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, diff::DiffArgs, init::InitArgs, lists::ListsArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "taskhub",
    version,
    about = "Keep to-do lists in step with issue tracker searches",
    long_about = None,
)]
struct Cli {
    /// Settings file (default: ~/.taskhub/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter settings file.
    Init(InitArgs),

    /// Show configured containers and their resolved queries.
    Lists(ListsArgs),

    /// Sync every container (or one) now.
    Sync(SyncArgs),

    /// Show what a sync would create and remove, without writing.
    Diff(DiffArgs),

    /// Run or control the background sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::resolve_config(cli.config)?;
    match cli.command {
        Commands::Init(args) => args.run(&config),
        Commands::Lists(args) => args.run(&config),
        Commands::Sync(args) => args.run(&config),
        Commands::Diff(args) => args.run(&config),
        Commands::Daemon { command } => commands::daemon::run(command, &config),
    }
}
