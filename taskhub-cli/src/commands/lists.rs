//! `taskhub lists`: configured containers with their effective queries.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use super::load_settings;

#[derive(Args, Debug)]
pub struct ListsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ListRow {
    #[tabled(rename = "container")]
    container: String,
    #[tabled(rename = "query")]
    query: String,
}

impl ListsArgs {
    pub fn run(self, config: &Path) -> Result<()> {
        let settings = load_settings(config)?;
        let tasks = settings.sync_tasks();

        if self.json {
            let payload: Vec<_> = tasks
                .iter()
                .map(|task| {
                    serde_json::json!({
                        "container": task.container.as_str(),
                        "query": task.query,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&payload)?);
            return Ok(());
        }

        println!(
            "taskhub v{} | {} → {} | {} lists | every {} min",
            env!("CARGO_PKG_VERSION"),
            settings.source.kind().bold(),
            settings.storage.kind().bold(),
            tasks.len(),
            settings.sync_interval,
        );
        let rows: Vec<ListRow> = tasks
            .into_iter()
            .map(|task| ListRow {
                container: task.container.to_string(),
                query: task.query,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
