//! Jira JQL search (REST API v2).

use serde::Deserialize;

use taskhub_core::{Issue, IssueList, JiraSettings};
use taskhub_sync::{SourceAdapter, SourceError};

use crate::http;

const PAGE_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    key: String,
    fields: Fields,
}

#[derive(Debug, Deserialize)]
struct Fields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    key: String,
}

pub struct JiraSource {
    agent: ureq::Agent,
    endpoint: String,
    token: String,
}

impl JiraSource {
    pub fn new(settings: &JiraSettings) -> Self {
        Self {
            agent: http::agent(),
            endpoint: http::base_url(&settings.endpoint),
            token: settings.token.clone(),
        }
    }

    /// `{endpoint}/browse/{key}`
    pub fn ticket_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.endpoint, key)
    }

    fn to_issue(&self, raw: JiraIssue) -> Issue {
        let origin = raw.fields.project.map(|p| p.key).unwrap_or_default();
        Issue::new(raw.fields.summary, self.ticket_url(&raw.key), origin)
    }

    fn fetch_page(&self, jql: &str, start_at: usize) -> Result<SearchPage, SourceError> {
        self.agent
            .get(&format!("{}/rest/api/2/search", self.endpoint))
            .set("Authorization", &format!("Bearer {}", self.token))
            .query("jql", jql)
            .query("startAt", &start_at.to_string())
            .query("maxResults", &PAGE_SIZE.to_string())
            .query("fields", "summary,project")
            .call()
            .map_err(http::source_error)?
            .into_json()
            .map_err(http::source_decode)
    }
}

impl SourceAdapter for JiraSource {
    fn search(&self, query: &str) -> Result<IssueList, SourceError> {
        let mut issues = IssueList::new();
        loop {
            let page = self.fetch_page(query, issues.len())?;
            if page.issues.is_empty() {
                break;
            }
            for raw in page.issues {
                issues.push(self.to_issue(raw));
            }
            if issues.len() >= page.total {
                break;
            }
        }
        tracing::info!(query, found = issues.len(), "jira search finished");
        Ok(issues)
    }
}
