//! GitHub issue search.

use serde::Deserialize;

use taskhub_core::{GithubSettings, Issue, IssueList};
use taskhub_sync::{SourceAdapter, SourceError};

use crate::http;

const PER_PAGE: usize = 100;
/// GitHub refuses to page past the first 1000 search results.
const SEARCH_RESULT_CAP: usize = 1000;

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: String,
    html_url: String,
    #[serde(default)]
    repository_url: String,
}

impl From<SearchItem> for Issue {
    fn from(item: SearchItem) -> Self {
        let origin = repo_slug(&item.repository_url);
        Issue::new(item.title, item.html_url, origin)
    }
}

/// `owner/repo` from an API repository URL such as
/// `https://api.github.com/repos/owner/repo`. Empty when the URL has fewer
/// than four `/`-separated parts.
pub fn repo_slug(repository_url: &str) -> String {
    let parts: Vec<&str> = repository_url.split('/').collect();
    if parts.len() < 4 {
        return String::new();
    }
    format!("{}/{}", parts[parts.len() - 2], parts[parts.len() - 1])
}

pub struct GithubSource {
    agent: ureq::Agent,
    api_url: String,
    token: String,
}

impl GithubSource {
    pub fn new(settings: &GithubSettings) -> Self {
        Self {
            agent: http::agent(),
            api_url: http::base_url(&settings.api_url),
            token: settings.token.clone(),
        }
    }

    fn fetch_page(&self, query: &str, page: usize) -> Result<SearchPage, SourceError> {
        self.agent
            .get(&format!("{}/search/issues", self.api_url))
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .query("q", query)
            .query("sort", "created")
            .query("order", "asc")
            .query("per_page", &PER_PAGE.to_string())
            .query("page", &page.to_string())
            .call()
            .map_err(http::source_error)?
            .into_json()
            .map_err(http::source_decode)
    }
}

impl SourceAdapter for GithubSource {
    fn search(&self, query: &str) -> Result<IssueList, SourceError> {
        let mut issues = IssueList::new();
        let mut page = 1;
        loop {
            let SearchPage { total_count, items } = self.fetch_page(query, page)?;
            let received = items.len();
            for item in items {
                issues.push(item.into());
            }
            if received < PER_PAGE
                || issues.len() >= total_count
                || issues.len() >= SEARCH_RESULT_CAP
            {
                break;
            }
            page += 1;
        }
        tracing::info!(query, found = issues.len(), "github search finished");
        Ok(issues)
    }
}
