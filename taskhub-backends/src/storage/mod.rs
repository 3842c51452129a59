//! Tracking surfaces.

pub mod markdown;
pub mod todoist;
pub mod trello;

use taskhub_core::{ContainerName, Issue, IssueList, StorageSettings};
use taskhub_sync::{ContainerId, StorageAdapter, StorageError};

pub use markdown::MarkdownStorage;
pub use todoist::TodoistStorage;
pub use trello::TrelloStorage;

use crate::error::{config_err, BackendError};

/// The configured storage backend.
pub enum Storage {
    Trello(TrelloStorage),
    Todoist(TodoistStorage),
    Markdown(MarkdownStorage),
}

impl Storage {
    /// Build the backend. No network calls are made here.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, BackendError> {
        match settings {
            StorageSettings::Trello(trello) => {
                if trello.boardid.trim().is_empty() {
                    return Err(config_err("trello", "`boardid` is empty"));
                }
                Ok(Storage::Trello(TrelloStorage::new(trello)))
            }
            StorageSettings::Todoist(todoist) => {
                let named = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
                if !named(&todoist.project_id) && !named(&todoist.project_name) {
                    return Err(config_err(
                        "todoist",
                        "one of `project_id` or `project_name` is required",
                    ));
                }
                Ok(Storage::Todoist(TodoistStorage::new(todoist)))
            }
            StorageSettings::Markdown(md) => {
                let dir = markdown::expand_home(&md.dir)?;
                Ok(Storage::Markdown(MarkdownStorage::new(dir)))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Storage::Trello(_) => "trello",
            Storage::Todoist(_) => "todoist",
            Storage::Markdown(_) => "markdown",
        }
    }

    fn adapter(&self) -> &dyn StorageAdapter {
        match self {
            Storage::Trello(s) => s,
            Storage::Todoist(s) => s,
            Storage::Markdown(s) => s,
        }
    }
}

impl StorageAdapter for Storage {
    fn ensure_container(&self, name: &ContainerName) -> Result<ContainerId, StorageError> {
        self.adapter().ensure_container(name)
    }

    fn list_items(&self, container: &ContainerId) -> Result<IssueList, StorageError> {
        self.adapter().list_items(container)
    }

    fn create(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        self.adapter().create(container, issue)
    }

    fn delete(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        self.adapter().delete(container, issue)
    }

    fn compare_by_title_only(&self) -> bool {
        self.adapter().compare_by_title_only()
    }

    fn commit(&self, description: &str) -> Result<(), StorageError> {
        self.adapter().commit(description)
    }
}
