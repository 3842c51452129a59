//! Error types for taskhub-sync.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`SourceAdapter`](crate::SourceAdapter).
#[derive(Debug, Error)]
pub enum SourceError {
    /// The provider throttled the request. The only recoverable variant.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The provider rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection, DNS or TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be understood.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Failures reported by a [`StorageAdapter`](crate::StorageAdapter).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    /// The backend accepted the request but refused the operation.
    #[error("backend rejected operation: {0}")]
    Backend(String),
}

/// A failed sync task. Every variant names the container and query so a
/// single log line is enough to diagnose it.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("search failed for '{container}' (query: {query}): {source}")]
    Search {
        container: String,
        query: String,
        #[source]
        source: SourceError,
    },

    #[error("{step} failed for '{container}' (query: {query}): {source}")]
    Storage {
        container: String,
        query: String,
        step: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("commit failed for '{container}' (query: {query}): {source}")]
    Commit {
        container: String,
        query: String,
        #[source]
        source: StorageError,
    },

    /// A worker thread died before reporting.
    #[error("sync worker for '{container}' panicked")]
    WorkerPanicked { container: String },
}

impl SyncError {
    pub fn container(&self) -> &str {
        match self {
            SyncError::Search { container, .. }
            | SyncError::Storage { container, .. }
            | SyncError::Commit { container, .. }
            | SyncError::WorkerPanicked { container } => container,
        }
    }
}

/// Convenience constructor for [`StorageError::Io`].
pub fn io_err(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.into(),
        source,
    }
}
