//! In-memory source and storage fakes shared by the pipeline tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use taskhub_core::{ContainerName, Issue, IssueList};
use taskhub_sync::{ContainerId, SourceAdapter, SourceError, StorageAdapter, StorageError};

pub fn issue(title: &str) -> Issue {
    Issue::new(title, format!("https://example.com/{title}"), "acme/repo")
}

pub fn issues(titles: &[&str]) -> IssueList {
    titles.iter().map(|t| issue(t)).collect()
}

// ---------------------------------------------------------------------------
// FakeSource
// ---------------------------------------------------------------------------

/// Query → canned results. Unknown queries return an empty list.
#[derive(Default)]
pub struct FakeSource {
    results: Mutex<HashMap<String, IssueList>>,
    failing: HashSet<String>,
    rate_limited_calls: AtomicUsize,
    searches: AtomicUsize,
    /// Artificial latency per search, used to overlap concurrent tasks.
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, query: &str, list: IssueList) -> Self {
        self.set(query, list);
        self
    }

    pub fn set(&self, query: &str, list: IssueList) {
        self.results
            .lock()
            .expect("results lock")
            .insert(query.to_string(), list);
    }

    /// `query` fails with an authentication error on every call.
    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    /// The next `n` searches are throttled.
    pub fn rate_limited_for(self, n: usize) -> Self {
        self.rate_limited_calls.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Highest number of searches observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl SourceAdapter for FakeSource {
    fn search(&self, query: &str) -> Result<IssueList, SourceError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let throttled = self
            .rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(SourceError::RateLimited {
                message: "secondary rate limit".to_string(),
                retry_after: None,
            });
        }
        if self.failing.contains(query) {
            return Err(SourceError::Auth("bad credentials".to_string()));
        }
        Ok(self
            .results
            .lock()
            .expect("results lock")
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// FakeStorage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ensure(String),
    List(String),
    Create(String, String),
    Delete(String, String),
    Commit(String),
}

/// Containers held in memory, keyed by name. Every call is journalled.
#[derive(Default)]
pub struct FakeStorage {
    containers: Mutex<BTreeMap<String, Vec<Issue>>>,
    calls: Mutex<Vec<Call>>,
    title_only: bool,
    /// Creates succeed this many times, then every create fails.
    create_budget: Mutex<Option<usize>>,
    fail_commit: bool,
    fail_list_for: HashSet<String>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title_only(mut self) -> Self {
        self.title_only = true;
        self
    }

    pub fn seeded(self, container: &str, list: IssueList) -> Self {
        self.containers
            .lock()
            .expect("containers lock")
            .insert(container.to_string(), list.into_iter().collect());
        self
    }

    pub fn failing_after_creates(self, n: usize) -> Self {
        *self.create_budget.lock().expect("budget lock") = Some(n);
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn failing_list_for(mut self, container: &str) -> Self {
        self.fail_list_for.insert(container.to_string());
        self
    }

    pub fn items(&self, container: &str) -> IssueList {
        self.containers
            .lock()
            .expect("containers lock")
            .get(container)
            .cloned()
            .unwrap_or_default()
            .into()
    }

    pub fn titles(&self, container: &str) -> Vec<String> {
        let mut titles = self.items(container).titles();
        titles.sort();
        titles
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn write_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Create(..) | Call::Delete(..) | Call::Commit(_)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

impl StorageAdapter for FakeStorage {
    fn ensure_container(&self, name: &ContainerName) -> Result<ContainerId, StorageError> {
        self.record(Call::Ensure(name.0.clone()));
        self.containers
            .lock()
            .expect("containers lock")
            .entry(name.0.clone())
            .or_default();
        Ok(ContainerId(name.0.clone()))
    }

    fn list_items(&self, container: &ContainerId) -> Result<IssueList, StorageError> {
        self.record(Call::List(container.0.clone()));
        if self.fail_list_for.contains(&container.0) {
            return Err(StorageError::Http {
                status: 500,
                message: "board unavailable".to_string(),
            });
        }
        Ok(self.items(&container.0))
    }

    fn create(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        self.record(Call::Create(container.0.clone(), issue.title.clone()));
        if let Some(budget) = self.create_budget.lock().expect("budget lock").as_mut() {
            if *budget == 0 {
                return Err(StorageError::Backend("card limit reached".to_string()));
            }
            *budget -= 1;
        }
        self.containers
            .lock()
            .expect("containers lock")
            .entry(container.0.clone())
            .or_default()
            .push(issue.clone());
        Ok(())
    }

    fn delete(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        self.record(Call::Delete(container.0.clone(), issue.title.clone()));
        if let Some(items) = self
            .containers
            .lock()
            .expect("containers lock")
            .get_mut(&container.0)
        {
            items.retain(|existing| existing.title != issue.title);
        }
        Ok(())
    }

    fn compare_by_title_only(&self) -> bool {
        self.title_only
    }

    fn commit(&self, description: &str) -> Result<(), StorageError> {
        self.record(Call::Commit(description.to_string()));
        if self.fail_commit {
            return Err(StorageError::Backend("push rejected".to_string()));
        }
        Ok(())
    }
}
