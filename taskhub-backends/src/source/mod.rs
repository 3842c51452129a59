//! Search providers.

pub mod github;
pub mod jira;

use taskhub_core::{IssueList, SourceSettings};
use taskhub_sync::{SourceAdapter, SourceError};

pub use github::GithubSource;
pub use jira::JiraSource;

use crate::error::{config_err, BackendError};

/// The configured search provider.
pub enum Source {
    Github(GithubSource),
    Jira(JiraSource),
}

impl Source {
    pub fn from_settings(settings: &SourceSettings) -> Result<Self, BackendError> {
        match settings {
            SourceSettings::Github(github) => Ok(Source::Github(GithubSource::new(github))),
            SourceSettings::Jira(jira) => {
                if jira.endpoint.trim().is_empty() {
                    return Err(config_err("jira", "`endpoint` is empty"));
                }
                Ok(Source::Jira(JiraSource::new(jira)))
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Source::Github(_) => "github",
            Source::Jira(_) => "jira",
        }
    }
}

impl SourceAdapter for Source {
    fn search(&self, query: &str) -> Result<IssueList, SourceError> {
        match self {
            Source::Github(source) => source.search(query),
            Source::Jira(source) => source.search(query),
        }
    }
}
