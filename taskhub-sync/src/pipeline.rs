//! Sync orchestration: one task per `(container, query)` pair.
//!
//! ## `run_sync_task`: strictly sequential pipeline
//!
//! 1. Search the source (wrapped in the retry policy).
//! 2. Ensure the container exists.
//! 3. List existing items.
//! 4. Read the storage's comparison granularity.
//! 5. Reconcile.
//! 6. Delete stale items.
//! 7. Create missing items.
//! 8. Commit; on failure wait out the cooldown, then report.
//!
//! A failure at any step aborts the task. Writes already applied stay
//! applied; the next run re-reconciles from whatever state the backend is in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use taskhub_core::{Settings, SyncTask};

use crate::adapter::{SourceAdapter, StorageAdapter};
use crate::error::{StorageError, SyncError};
use crate::reconcile::{reconcile, SyncPlan};
use crate::retry::{with_retry, RetryPolicy};

/// Knobs for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Worker threads for [`run_all`]. `0` and `1` both mean sequential.
    pub parallelism: usize,
    /// Plan only: no create, delete or commit.
    pub dry_run: bool,
    pub retry: RetryPolicy,
    pub commit_cooldown: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            dry_run: false,
            retry: RetryPolicy::default(),
            commit_cooldown: Duration::from_secs(15 * 60),
        }
    }
}

impl SyncOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            parallelism: settings.parallelism,
            dry_run: false,
            retry: RetryPolicy::from_settings(&settings.retry),
            commit_cooldown: settings.commit_cooldown(),
        }
    }
}

/// Steps 1–5 of a task: what would change, without changing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskPlan {
    pub fetched: usize,
    pub existing: usize,
    pub title_only: bool,
    pub plan: SyncPlan,
}

/// Outcome of one successful task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub container: String,
    pub query: String,
    pub fetched: usize,
    pub existing: usize,
    pub created: usize,
    pub removed: usize,
    pub dry_run: bool,
    pub created_titles: Vec<String>,
    pub removed_titles: Vec<String>,
}

/// One entry of [`run_all`]'s output, in task order.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: SyncTask,
    pub result: Result<SyncReport, SyncError>,
}

impl TaskOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

fn storage_err(task: &SyncTask, step: &'static str) -> impl FnOnce(StorageError) -> SyncError {
    let container = task.container.0.clone();
    let query = task.query.clone();
    move |source| SyncError::Storage {
        container,
        query,
        step,
        source,
    }
}

// ---------------------------------------------------------------------------
// plan_sync_task
// ---------------------------------------------------------------------------

/// Run steps 1–5 and return the reconciled plan.
///
/// Calls `ensure_container`, which may create an empty container.
pub fn plan_sync_task<S, T>(
    task: &SyncTask,
    source: &S,
    storage: &T,
    retry: &RetryPolicy,
) -> Result<TaskPlan, SyncError>
where
    S: SourceAdapter + ?Sized,
    T: StorageAdapter + ?Sized,
{
    let required = with_retry(retry, || source.search(&task.query)).map_err(|source| {
        SyncError::Search {
            container: task.container.0.clone(),
            query: task.query.clone(),
            source,
        }
    })?;
    tracing::debug!(
        container = %task.container,
        query = %task.query,
        fetched = required.len(),
        "fetched search results",
    );

    let container_id = storage
        .ensure_container(&task.container)
        .map_err(storage_err(task, "ensure container"))?;

    let existing = storage
        .list_items(&container_id)
        .map_err(storage_err(task, "list items"))?;

    let title_only = storage.compare_by_title_only();
    let plan = reconcile(&required, &existing, title_only);

    Ok(TaskPlan {
        fetched: required.len(),
        existing: existing.len(),
        title_only,
        plan,
    })
}

// ---------------------------------------------------------------------------
// run_sync_task
// ---------------------------------------------------------------------------

/// Bring one container in line with its query.
pub fn run_sync_task<S, T>(
    task: &SyncTask,
    source: &S,
    storage: &T,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: SourceAdapter + ?Sized,
    T: StorageAdapter + ?Sized,
{
    let result = apply_task(task, source, storage, options);
    match &result {
        Ok(report) => tracing::info!(
            container = %report.container,
            query = %report.query,
            fetched = report.fetched,
            created = report.created,
            removed = report.removed,
            dry_run = report.dry_run,
            "sync task completed",
        ),
        Err(err) => tracing::error!(
            container = %task.container,
            query = %task.query,
            error = %err,
            "sync task failed",
        ),
    }
    result
}

fn apply_task<S, T>(
    task: &SyncTask,
    source: &S,
    storage: &T,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: SourceAdapter + ?Sized,
    T: StorageAdapter + ?Sized,
{
    let TaskPlan {
        fetched,
        existing,
        plan,
        ..
    } = plan_sync_task(task, source, storage, &options.retry)?;

    let mut report = SyncReport {
        container: task.container.0.clone(),
        query: task.query.clone(),
        fetched,
        existing,
        created: plan.to_create.len(),
        removed: plan.to_delete.len(),
        dry_run: options.dry_run,
        created_titles: plan.to_create.titles(),
        removed_titles: plan.to_delete.titles(),
    };

    if options.dry_run {
        return Ok(report);
    }

    report.removed = 0;
    for issue in &plan.to_delete {
        storage
            .delete(&task.container, issue)
            .map_err(storage_err(task, "delete"))?;
        report.removed += 1;
        tracing::info!(container = %task.container, title = %issue.title, "removed item");
    }

    report.created = 0;
    for issue in &plan.to_create {
        storage
            .create(&task.container, issue)
            .map_err(storage_err(task, "create"))?;
        report.created += 1;
        tracing::info!(container = %task.container, title = %issue.title, "created item");
    }

    if let Err(source) = storage.commit(&task.query) {
        tracing::error!(
            container = %task.container,
            query = %task.query,
            error = %source,
            cooldown_secs = options.commit_cooldown.as_secs(),
            "commit failed, cooling down before reporting",
        );
        std::thread::sleep(options.commit_cooldown);
        return Err(SyncError::Commit {
            container: task.container.0.clone(),
            query: task.query.clone(),
            source,
        });
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// run_all
// ---------------------------------------------------------------------------

/// Run every task; one task's failure never prevents the others.
///
/// With `parallelism > 1` a pool of that many scoped worker threads pulls
/// tasks from a shared cursor; `source` and `storage` are shared by
/// reference. Outcomes come back in task order either way.
pub fn run_all<S, T>(
    tasks: &[SyncTask],
    source: &S,
    storage: &T,
    options: &SyncOptions,
) -> Vec<TaskOutcome>
where
    S: SourceAdapter + ?Sized,
    T: StorageAdapter + ?Sized,
{
    let workers = options.parallelism.min(tasks.len());
    let outcomes: Vec<TaskOutcome> = if workers <= 1 {
        tasks
            .iter()
            .map(|task| TaskOutcome {
                task: task.clone(),
                result: run_sync_task(task, source, storage, options),
            })
            .collect()
    } else {
        run_pool(tasks, source, storage, options, workers)
    };

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    tracing::info!(
        tasks = outcomes.len(),
        failed,
        dry_run = options.dry_run,
        "sync run finished",
    );
    outcomes
}

fn run_pool<S, T>(
    tasks: &[SyncTask],
    source: &S,
    storage: &T,
    options: &SyncOptions,
    workers: usize,
) -> Vec<TaskOutcome>
where
    S: SourceAdapter + ?Sized,
    T: StorageAdapter + ?Sized,
{
    let cursor = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<Result<SyncReport, SyncError>>>> =
        tasks.iter().map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| loop {
                    let idx = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(idx) else { break };
                    let result = run_sync_task(task, source, storage, options);
                    *slots[idx].lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
                })
            })
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("sync worker thread panicked");
            }
        }
    });

    tasks
        .iter()
        .zip(slots)
        .map(|(task, slot)| {
            let result = slot
                .into_inner()
                .unwrap_or_else(|e| e.into_inner())
                .unwrap_or_else(|| {
                    Err(SyncError::WorkerPanicked {
                        container: task.container.0.clone(),
                    })
                });
            TaskOutcome {
                task: task.clone(),
                result,
            }
        })
        .collect()
}
