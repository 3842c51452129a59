//! Taskhub core library: issue model, fingerprints, settings, errors.
//!
//! - [`types`]: [`Issue`], [`IssueList`], [`SyncTask`] and newtypes
//! - [`fingerprint`]: pure SHA-256 fingerprints and set differences
//! - [`settings`]: YAML settings load / validate / scaffold
//! - [`error`]: [`SettingsError`]

pub mod error;
pub mod fingerprint;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use fingerprint::{fingerprint, fingerprint_map, outer_difference, FingerprintMap};
pub use settings::{
    GithubSettings, JiraSettings, MarkdownSettings, RetrySettings, Settings, SourceSettings,
    StorageSettings, TodoistSettings, TrelloSettings,
};
pub use types::{ContainerName, Issue, IssueList, SyncTask};
