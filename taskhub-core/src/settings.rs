//! YAML settings file.
//!
//! # Storage layout
//!
//! ```text
//! ~/.taskhub/
//!   config.yaml   (mode 0600, created by `taskhub init`)
//! ```
//!
//! # API pattern
//!
//! Every path-dependent function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! [`load_from`] reads an arbitrary path (the CLI `--config` flag).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, SettingsError};
use crate::types::SyncTask;

pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 5;
pub const DEFAULT_PARALLELISM: usize = 1;
pub const DEFAULT_COMMIT_COOLDOWN_SECS: u64 = 15 * 60;
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_TRELLO_API: &str = "https://api.trello.com";
pub const DEFAULT_TODOIST_SYNC_ENDPOINT: &str = "https://api.todoist.com/sync/v9/sync";

// ---------------------------------------------------------------------------
// 1. Settings types
// ---------------------------------------------------------------------------

/// Root of the YAML settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Minutes between scheduled syncs.
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u64,

    /// Number of sync tasks allowed to run at once. `1` runs them in order.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Pause after a failed commit before the error is surfaced.
    #[serde(default = "default_commit_cooldown")]
    pub commit_cooldown_secs: u64,

    /// Prepended (with one space) to every query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_prefix: Option<String>,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Container name → query.
    #[serde(default)]
    pub lists: BTreeMap<String, String>,

    pub source: SourceSettings,
    pub storage: StorageSettings,
}

/// Bounded retry policy for source searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

/// Search backend, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceSettings {
    Github(GithubSettings),
    Jira(JiraSettings),
}

impl SourceSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceSettings::Github(_) => "github",
            SourceSettings::Jira(_) => "jira",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubSettings {
    pub token: String,
    #[serde(default = "default_github_api")]
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraSettings {
    /// Base URL of the Jira instance, e.g. `https://issues.example.com`.
    pub endpoint: String,
    pub token: String,
}

/// Tracking backend, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageSettings {
    Trello(TrelloSettings),
    Todoist(TodoistSettings),
    Markdown(MarkdownSettings),
}

impl StorageSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageSettings::Trello(_) => "trello",
            StorageSettings::Todoist(_) => "todoist",
            StorageSettings::Markdown(_) => "markdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrelloSettings {
    pub appkey: String,
    pub token: String,
    pub boardid: String,
    #[serde(default = "default_trello_api")]
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoistSettings {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default = "default_todoist_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownSettings {
    /// Directory holding one `<container>.md` file per container.
    pub dir: PathBuf,
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_MINUTES
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

fn default_commit_cooldown() -> u64 {
    DEFAULT_COMMIT_COOLDOWN_SECS
}

fn default_github_api() -> String {
    DEFAULT_GITHUB_API.to_string()
}

fn default_trello_api() -> String {
    DEFAULT_TRELLO_API.to_string()
}

fn default_todoist_endpoint() -> String {
    DEFAULT_TODOIST_SYNC_ENDPOINT.to_string()
}

// ---------------------------------------------------------------------------
// 2. Derived values
// ---------------------------------------------------------------------------

impl Settings {
    /// Resolved `(container, query)` pairs, sorted by container name, with
    /// the search prefix applied.
    pub fn sync_tasks(&self) -> Vec<SyncTask> {
        self.lists
            .iter()
            .map(|(container, query)| SyncTask::new(container.as_str(), self.apply_prefix(query)))
            .collect()
    }

    /// `"<prefix> <query>"`, or the query unchanged when no prefix is set.
    pub fn apply_prefix(&self, query: &str) -> String {
        match self.search_prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix} {query}"),
            _ => query.to_string(),
        }
    }

    /// Minutes as a duration, saturating for absurdly large values.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval.saturating_mul(60))
    }

    pub fn commit_cooldown(&self) -> Duration {
        Duration::from_secs(self.commit_cooldown_secs)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.lists.is_empty() {
            return Err("`lists` must map at least one container to a query".to_string());
        }
        if let Some(name) = self.lists.keys().find(|name| name.trim().is_empty()) {
            return Err(format!("container name {name:?} is empty"));
        }
        if self.sync_interval == 0 {
            return Err("`sync_interval` must be at least 1 minute".to_string());
        }
        if self.parallelism == 0 {
            return Err("`parallelism` must be at least 1".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("`retry.max_attempts` must be at least 1".to_string());
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err("`retry.initial_backoff_ms` exceeds `retry.max_backoff_ms`".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 3. Paths
// ---------------------------------------------------------------------------

/// `<home>/.taskhub/`
pub fn taskhub_root(home: &Path) -> PathBuf {
    home.join(".taskhub")
}

/// `<home>/.taskhub/config.yaml`, pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    taskhub_root(home).join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, SettingsError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load and validate settings from an explicit file path.
///
/// Returns `SettingsError::NotFound` if absent,
/// `SettingsError::Parse` (with path + line context) if malformed YAML,
/// `SettingsError::Invalid` if the content fails [`Settings::validate`].
pub fn load_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        return Err(SettingsError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let settings: Settings = serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    settings.validate().map_err(|reason| SettingsError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(settings)
}

/// Load `<home>/.taskhub/config.yaml`.
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Init (atomic)
// ---------------------------------------------------------------------------

const STARTER_CONFIG: &str = r#"# taskhub settings
# Minutes between scheduled syncs.
sync_interval: 5
# Number of lists synced at the same time.
parallelism: 1
# Pause after a failed commit before reporting it, in seconds.
commit_cooldown_secs: 900
search_prefix: "is:open"
retry:
  max_attempts: 5
  initial_backoff_ms: 1000
  max_backoff_ms: 60000
lists:
  "Review requests": "review-requested:@me"
  "Assigned": "assignee:@me"
source:
  kind: github
  token: "<github token>"
storage:
  kind: markdown
  dir: "~/taskhub-lists"
"#;

/// Write a starter settings file to `path`.
///
/// Write flow: `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// Idempotent unless `force`: returns `Ok(false)` and leaves an existing file
/// untouched.
pub fn init_file(path: &Path, force: bool) -> Result<bool, SettingsError> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, STARTER_CONFIG).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(true)
}

/// Scaffold `<home>/.taskhub/config.yaml`. Returns the path and whether it was written.
pub fn init_at(home: &Path, force: bool) -> Result<(PathBuf, bool), SettingsError> {
    let path = config_path_at(home);
    let written = init_file(&path, force)?;
    Ok((path, written))
}

/// `init_at` convenience wrapper.
pub fn init(force: bool) -> Result<(PathBuf, bool), SettingsError> {
    init_at(&home()?, force)
}

/// Parse a settings document from a string, without validation.
pub fn from_yaml(contents: &str) -> Result<Settings, serde_yaml::Error> {
    serde_yaml::from_str(contents)
}

/// Serialize settings back to YAML.
pub fn to_yaml(settings: &Settings) -> Result<String, SettingsError> {
    Ok(serde_yaml::to_string(settings)?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
