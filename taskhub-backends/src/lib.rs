//! # taskhub-backends
//!
//! Concrete [`SourceAdapter`](taskhub_sync::SourceAdapter) and
//! [`StorageAdapter`](taskhub_sync::StorageAdapter) implementations.
//!
//! - sources: GitHub issue search, Jira JQL search
//! - storages: Trello boards, Todoist projects, local markdown files
//!
//! [`Source::from_settings`] and [`Storage::from_settings`] pick the backend
//! named by the settings `kind` tag.

pub mod error;
mod http;
pub mod source;
pub mod storage;

pub use error::BackendError;
pub use source::{GithubSource, JiraSource, Source};
pub use storage::{MarkdownStorage, Storage, TodoistStorage, TrelloStorage};

use taskhub_core::Settings;

/// Build both backends for `settings`.
pub fn from_settings(settings: &Settings) -> Result<(Source, Storage), BackendError> {
    let source = Source::from_settings(&settings.source)?;
    let storage = Storage::from_settings(&settings.storage)?;
    tracing::debug!(
        source = source.kind(),
        storage = storage.kind(),
        "backends ready"
    );
    Ok((source, storage))
}
