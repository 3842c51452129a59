//! # taskhub-sync
//!
//! Adapter contracts, reconciliation and the sync pipeline.
//!
//! Call [`run_sync_task`] to bring a single container in line with its query,
//! or [`run_all`] to process every configured list. Backends implement
//! [`SourceAdapter`] and [`StorageAdapter`]; the orchestrator only ever sees
//! those traits.

pub mod adapter;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod retry;

pub use adapter::{ContainerId, SourceAdapter, StorageAdapter};
pub use error::{io_err, SourceError, StorageError, SyncError};
pub use pipeline::{
    plan_sync_task, run_all, run_sync_task, SyncOptions, SyncReport, TaskOutcome, TaskPlan,
};
pub use reconcile::{reconcile, SyncPlan};
pub use retry::{with_retry, with_retry_using, Recoverable, RetryPolicy};
