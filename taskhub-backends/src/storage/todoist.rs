//! Todoist storage over the Sync API.
//!
//! Containers are sections of one project. Each item's content is a
//! markdown link `[title](url)` and the issue origin is stored as the first
//! label. Item writes are buffered as sync commands and flushed by `commit`;
//! project, section and label creation are sent straight away because later
//! commands need the server-assigned ids.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use taskhub_core::{ContainerName, Issue, IssueList, TodoistSettings};
use taskhub_sync::{ContainerId, StorageAdapter, StorageError};

use crate::http;

const RESOURCE_TYPES: &str = r#"["projects","sections","items","labels"]"#;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    sections: Vec<Section>,
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    name: String,
    #[serde(default)]
    is_deleted: bool,
}

#[derive(Debug, Deserialize)]
struct Section {
    id: String,
    name: String,
    project_id: String,
    #[serde(default)]
    is_deleted: bool,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    content: String,
    #[serde(default)]
    section_id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    checked: bool,
    #[serde(default)]
    is_deleted: bool,
}

impl Item {
    fn is_open_in(&self, section_id: &str) -> bool {
        !self.checked && !self.is_deleted && self.section_id.as_deref() == Some(section_id)
    }

    fn to_issue(&self) -> Issue {
        let (title, url) = parse_link(&self.content);
        let origin = self.labels.first().cloned().unwrap_or_default();
        Issue::new(title, url, origin)
    }
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
    #[serde(default)]
    is_deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Command {
    #[serde(rename = "type")]
    kind: &'static str,
    uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    temp_id: Option<String>,
    args: Value,
}

impl Command {
    fn new(kind: &'static str, args: Value) -> Self {
        Self {
            kind,
            uuid: Uuid::new_v4().to_string(),
            temp_id: None,
            args,
        }
    }

    fn with_temp_id(kind: &'static str, args: Value) -> Self {
        Self {
            temp_id: Some(Uuid::new_v4().to_string()),
            ..Self::new(kind, args)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    sync_status: HashMap<String, Value>,
    #[serde(default)]
    temp_id_mapping: HashMap<String, String>,
}

impl CommandResponse {
    fn rejection(&self, command: &Command) -> Option<String> {
        match self.sync_status.get(&command.uuid) {
            Some(Value::String(s)) if s == "ok" => None,
            Some(status) => Some(status.to_string()),
            None => Some("no status returned".to_string()),
        }
    }

    fn describe(&self, rejected: &[&Command]) -> String {
        rejected
            .iter()
            .map(|cmd| {
                let reason = self.rejection(cmd).unwrap_or_default();
                format!("{} {}: {}", cmd.kind, cmd.uuid, reason)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ---------------------------------------------------------------------------
// Content helpers
// ---------------------------------------------------------------------------

static LINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?P<title>.*)\]\((?P<url>.*)\)").expect("LINK_REGEX is a valid regex literal")
});

/// `[title](url)`
pub fn markdown_link(title: &str, url: &str) -> String {
    format!("[{title}]({url})")
}

/// Split item content into `(title, url)`. Content that is not a markdown
/// link is taken as a bare title.
pub fn parse_link(content: &str) -> (String, String) {
    match LINK_REGEX.captures(content) {
        Some(caps) => (caps["title"].to_string(), caps["url"].to_string()),
        None => (content.to_string(), String::new()),
    }
}

// ---------------------------------------------------------------------------
// TodoistStorage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct State {
    project_id: Option<String>,
    snapshot: Snapshot,
    pending: Vec<Command>,
}

pub struct TodoistStorage {
    agent: ureq::Agent,
    endpoint: String,
    token: String,
    project_id: Option<String>,
    project_name: Option<String>,
    state: Mutex<State>,
}

impl TodoistStorage {
    pub fn new(settings: &TodoistSettings) -> Self {
        Self {
            agent: http::agent(),
            endpoint: settings.endpoint.clone(),
            token: settings.token.clone(),
            project_id: settings.project_id.clone().filter(|s| !s.is_empty()),
            project_name: settings.project_name.clone().filter(|s| !s.is_empty()),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn post(&self, form: &[(&str, &str)]) -> Result<ureq::Response, StorageError> {
        self.agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_form(form)
            .map_err(http::storage_error)
    }

    fn read(&self) -> Result<Snapshot, StorageError> {
        self.post(&[("sync_token", "*"), ("resource_types", RESOURCE_TYPES)])?
            .into_json()
            .map_err(http::storage_decode)
    }

    /// Send `commands` and fail if any of them was rejected.
    fn post_commands(&self, commands: &[Command]) -> Result<CommandResponse, StorageError> {
        let encoded = serde_json::to_string(commands)
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        self.post(&[("commands", encoded.as_str())])?
            .into_json()
            .map_err(http::storage_decode)
    }

    fn send(&self, commands: &[Command]) -> Result<HashMap<String, String>, StorageError> {
        let response = self.post_commands(commands)?;
        let rejected: Vec<&Command> = commands
            .iter()
            .filter(|cmd| response.rejection(cmd).is_some())
            .collect();
        if !rejected.is_empty() {
            return Err(StorageError::Backend(response.describe(&rejected)));
        }
        Ok(response.temp_id_mapping)
    }

    /// Send a single creation command now and return the real id. The
    /// snapshot is refreshed afterwards.
    fn create_now(&self, state: &mut State, command: Command) -> Result<String, StorageError> {
        let temp_id = command.temp_id.clone().unwrap_or_default();
        let mapping = self.send(std::slice::from_ref(&command))?;
        let id = mapping.get(&temp_id).cloned().unwrap_or(temp_id);
        state.snapshot = self.read()?;
        Ok(id)
    }

    fn ensure_project(&self, state: &mut State) -> Result<String, StorageError> {
        if let Some(id) = &state.project_id {
            return Ok(id.clone());
        }
        state.snapshot = self.read()?;
        let projects = &state.snapshot.projects;

        let found = if let Some(id) = &self.project_id {
            let Some(project) = projects.iter().find(|p| &p.id == id && !p.is_deleted) else {
                return Err(StorageError::Backend(format!("project id {id} not found")));
            };
            Some(project.id.clone())
        } else {
            self.project_name.as_ref().and_then(|name| {
                projects
                    .iter()
                    .find(|p| &p.name == name && !p.is_deleted)
                    .map(|p| p.id.clone())
            })
        };

        let id = match found {
            Some(id) => id,
            None => {
                let name = self.project_name.clone().unwrap_or_default();
                tracing::info!(project = %name, "creating todoist project");
                self.create_now(
                    state,
                    Command::with_temp_id("project_add", json!({ "name": name })),
                )?
            }
        };
        state.project_id = Some(id.clone());
        Ok(id)
    }

    fn section_id(&self, state: &mut State, name: &ContainerName) -> Result<String, StorageError> {
        let project_id = self.ensure_project(state)?;
        let existing = state
            .snapshot
            .sections
            .iter()
            .find(|s| s.project_id == project_id && s.name == name.as_str() && !s.is_deleted)
            .map(|s| s.id.clone());
        if let Some(id) = existing {
            return Ok(id);
        }
        tracing::info!(container = %name, "creating todoist section");
        let id = self.create_now(
            state,
            Command::with_temp_id(
                "section_add",
                json!({ "name": name.as_str(), "project_id": project_id }),
            ),
        )?;
        let sections = &mut state.snapshot.sections;
        if !sections.iter().any(|s| s.id == id) {
            sections.push(Section {
                id: id.clone(),
                name: name.0.clone(),
                project_id,
                is_deleted: false,
            });
        }
        Ok(id)
    }

    fn ensure_label(&self, state: &mut State, name: &str) -> Result<(), StorageError> {
        if name.is_empty()
            || state
                .snapshot
                .labels
                .iter()
                .any(|l| l.name == name && !l.is_deleted)
        {
            return Ok(());
        }
        tracing::info!(label = name, "creating todoist label");
        self.create_now(state, Command::with_temp_id("label_add", json!({ "name": name })))?;
        if !state.snapshot.labels.iter().any(|l| l.name == name) {
            state.snapshot.labels.push(Label {
                name: name.to_string(),
                is_deleted: false,
            });
        }
        Ok(())
    }

    /// Commands waiting for the next `commit`.
    pub fn pending_commands(&self) -> usize {
        self.lock().pending.len()
    }
}

impl StorageAdapter for TodoistStorage {
    fn ensure_container(&self, name: &ContainerName) -> Result<ContainerId, StorageError> {
        let mut state = self.lock();
        self.section_id(&mut state, name).map(ContainerId)
    }

    fn list_items(&self, container: &ContainerId) -> Result<IssueList, StorageError> {
        let mut state = self.lock();
        state.snapshot = self.read()?;
        Ok(state
            .snapshot
            .items
            .iter()
            .filter(|item| item.is_open_in(&container.0))
            .map(Item::to_issue)
            .collect())
    }

    fn create(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        let mut state = self.lock();
        let section_id = self.section_id(&mut state, container)?;
        let project_id = self.ensure_project(&mut state)?;
        self.ensure_label(&mut state, &issue.origin)?;

        let labels: Vec<&str> = if issue.origin.is_empty() {
            Vec::new()
        } else {
            vec![issue.origin.as_str()]
        };
        state.pending.push(Command::with_temp_id(
            "item_add",
            json!({
                "content": markdown_link(&issue.title, &issue.url),
                "project_id": project_id,
                "section_id": section_id,
                "labels": labels,
            }),
        ));
        Ok(())
    }

    fn delete(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        let mut state = self.lock();
        let section_id = self.section_id(&mut state, container)?;
        let target = state
            .snapshot
            .items
            .iter()
            .find(|item| item.is_open_in(&section_id) && item.to_issue().title == issue.title)
            .map(|item| item.id.clone());
        if let Some(id) = target {
            state
                .pending
                .push(Command::new("item_close", json!({ "id": id })));
        }
        Ok(())
    }

    fn compare_by_title_only(&self) -> bool {
        true
    }

    /// Flushes every buffered command, including those queued by other
    /// containers sharing this storage. Commands the API did not accept stay
    /// buffered, so every later commit keeps failing until they go through.
    /// Todoist deduplicates by command uuid, which makes the resend safe.
    fn commit(&self, description: &str) -> Result<(), StorageError> {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        if pending.is_empty() {
            tracing::debug!(description, "nothing to commit");
            return Ok(());
        }

        let response = match self.post_commands(&pending) {
            Ok(response) => response,
            Err(err) => {
                state.pending = pending;
                return Err(err);
            }
        };
        let (rejected, accepted): (Vec<Command>, Vec<Command>) = pending
            .into_iter()
            .partition(|cmd| response.rejection(cmd).is_some());
        if !rejected.is_empty() {
            let message = response.describe(&rejected.iter().collect::<Vec<_>>());
            tracing::warn!(
                description,
                accepted = accepted.len(),
                rejected = rejected.len(),
                "todoist rejected commands; keeping them buffered"
            );
            state.pending = rejected;
            if !accepted.is_empty() {
                state.snapshot = self.read()?;
            }
            return Err(StorageError::Backend(message));
        }

        tracing::info!(description, commands = accepted.len(), "committed todoist commands");
        state.snapshot = self.read()?;
        Ok(())
    }
}
