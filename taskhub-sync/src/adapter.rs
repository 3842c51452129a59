//! Capability contracts between the orchestrator and concrete backends.
//!
//! Both traits are blocking: every method is a suspension point from the
//! orchestrator's point of view. Implementations must be `Send + Sync` because
//! one storage instance is shared by every task of a run, possibly from
//! several worker threads. Backends that hold mutable client state guard it
//! with their own lock.

use std::fmt;
use std::sync::Arc;

use taskhub_core::{ContainerName, Issue, IssueList};

use crate::error::{SourceError, StorageError};

/// Backend-assigned identifier of a container (list id, section id, file path).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A search provider.
pub trait SourceAdapter: Send + Sync {
    /// Run `query` and return the normalised hits in provider order.
    ///
    /// Rate limiting must be reported as [`SourceError::RateLimited`] so the
    /// caller's retry policy can classify it.
    fn search(&self, query: &str) -> Result<IssueList, SourceError>;
}

/// A tracking surface holding named containers of items.
pub trait StorageAdapter: Send + Sync {
    /// Idempotent get-or-create.
    fn ensure_container(&self, name: &ContainerName) -> Result<ContainerId, StorageError>;

    /// Items currently in the container, translated into issues.
    fn list_items(&self, container: &ContainerId) -> Result<IssueList, StorageError>;

    fn create(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError>;

    /// Remove the item matching `issue` under this storage's comparison
    /// granularity: the title when [`compare_by_title_only`] holds, the full
    /// value otherwise. Absent or already closed items are not an error.
    ///
    /// [`compare_by_title_only`]: StorageAdapter::compare_by_title_only
    fn delete(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError>;

    /// `true` when url/origin cannot be read back faithfully.
    fn compare_by_title_only(&self) -> bool;

    /// Flush buffered writes.
    fn commit(&self, description: &str) -> Result<(), StorageError>;
}

impl<T: SourceAdapter + ?Sized> SourceAdapter for Arc<T> {
    fn search(&self, query: &str) -> Result<IssueList, SourceError> {
        (**self).search(query)
    }
}

impl<T: StorageAdapter + ?Sized> StorageAdapter for Arc<T> {
    fn ensure_container(&self, name: &ContainerName) -> Result<ContainerId, StorageError> {
        (**self).ensure_container(name)
    }

    fn list_items(&self, container: &ContainerId) -> Result<IssueList, StorageError> {
        (**self).list_items(container)
    }

    fn create(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        (**self).create(container, issue)
    }

    fn delete(&self, container: &ContainerName, issue: &Issue) -> Result<(), StorageError> {
        (**self).delete(container, issue)
    }

    fn compare_by_title_only(&self) -> bool {
        (**self).compare_by_title_only()
    }

    fn commit(&self, description: &str) -> Result<(), StorageError> {
        (**self).commit(description)
    }
}
