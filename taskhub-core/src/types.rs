//! Domain types for issue synchronisation.
//!
//! An [`Issue`] is the unit both sides of a sync agree on: a search hit from
//! a source backend, or an item read back from a storage container.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{self, FingerprintMap};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a storage container (board list, app section).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerName(pub String);

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContainerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContainerName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl ContainerName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

/// A trackable unit of work.
///
/// `title` is the identity key within a container. `origin` is a free-form
/// tag such as a repository slug or a project key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub origin: String,
}

impl Issue {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            origin: origin.into(),
        }
    }

    /// Canonical full-value representation: `{<title> <url> <origin>}`.
    pub fn canonical(&self) -> String {
        format!("{{{} {} {}}}", self.title, self.url, self.origin)
    }
}

// ---------------------------------------------------------------------------
// IssueList
// ---------------------------------------------------------------------------

/// Ordered sequence of issues.
///
/// Order is preserved for display only; set operations ignore it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueList {
    issues: Vec<Issue>,
}

impl IssueList {
    pub fn new() -> Self {
        Self::default()
    }

    /// First issue with exactly this title.
    pub fn get(&self, title: &str) -> Option<&Issue> {
        self.issues.iter().find(|issue| issue.title == title)
    }

    /// Drop every issue with this title. Absent titles are a no-op.
    pub fn remove(&mut self, title: &str) {
        self.issues.retain(|issue| issue.title != title);
    }

    /// One issue per title, the last occurrence winning, in the order the
    /// survivors appeared. Dropped duplicates are logged.
    pub fn last_per_title(&self) -> IssueList {
        let mut last = std::collections::HashMap::with_capacity(self.issues.len());
        for (index, issue) in self.issues.iter().enumerate() {
            if last.insert(issue.title.as_str(), index).is_some() {
                tracing::warn!(title = %issue.title, "duplicate title; keeping the last occurrence");
            }
        }
        self.issues
            .iter()
            .enumerate()
            .filter(|(index, issue)| last.get(issue.title.as_str()) == Some(index))
            .map(|(_, issue)| issue.clone())
            .collect()
    }

    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.issues.iter()
    }

    pub fn as_slice(&self) -> &[Issue] {
        &self.issues
    }

    pub fn titles(&self) -> Vec<String> {
        self.issues.iter().map(|issue| issue.title.clone()).collect()
    }

    /// Build the fingerprint map for this list. See [`fingerprint::fingerprint_map`].
    pub fn fingerprint_map(&self, title_only: bool) -> FingerprintMap {
        fingerprint::fingerprint_map(self, title_only)
    }
}

impl From<Vec<Issue>> for IssueList {
    fn from(issues: Vec<Issue>) -> Self {
        Self { issues }
    }
}

impl FromIterator<Issue> for IssueList {
    fn from_iter<I: IntoIterator<Item = Issue>>(iter: I) -> Self {
        Self {
            issues: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for IssueList {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.into_iter()
    }
}

impl<'a> IntoIterator for &'a IssueList {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.issues.iter()
    }
}

// ---------------------------------------------------------------------------
// SyncTask
// ---------------------------------------------------------------------------

/// One unit of reconciliation work: keep `container` equal to the result of
/// `query`. Carries no state between runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTask {
    pub container: ContainerName,
    pub query: String,
}

impl SyncTask {
    pub fn new(container: impl Into<ContainerName>, query: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            query: query.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
