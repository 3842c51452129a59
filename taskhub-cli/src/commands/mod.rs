pub mod daemon;
pub mod diff;
pub mod init;
pub mod lists;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use taskhub_core::{settings, Settings, SyncTask};

/// `--config` when given, otherwise `~/.taskhub/config.yaml`.
pub fn resolve_config(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => settings::config_path().context("could not locate the default settings file"),
    }
}

pub fn load_settings(config: &Path) -> Result<Settings> {
    settings::load_from(config)
        .with_context(|| format!("failed to load settings from {}", config.display()))
}

/// All tasks, or the one whose container is `container`.
pub fn select_tasks(settings: &Settings, container: Option<&str>) -> Result<Vec<SyncTask>> {
    let tasks = settings.sync_tasks();
    let Some(name) = container else {
        return Ok(tasks);
    };
    let selected: Vec<SyncTask> = tasks
        .into_iter()
        .filter(|task| task.container.as_str() == name)
        .collect();
    if selected.is_empty() {
        let known: Vec<&str> = settings.lists.keys().map(String::as_str).collect();
        bail!("unknown container '{name}' (configured: {})", known.join(", "));
    }
    Ok(selected)
}
