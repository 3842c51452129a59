use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use taskhub_core::{settings, Settings, SyncTask};
use taskhub_sync::{run_all, SyncOptions, TaskOutcome};

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, taskhub_root, DEBOUNCE_WINDOW};
use crate::protocol::{ControlReply, ControlRequest};

/// Last settings that parsed and validated.
type SettingsCache = Arc<RwLock<Settings>>;

/// Container name -> outcome of its most recent run.
type StatusTable = Arc<RwLock<BTreeMap<String, ContainerStatus>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncTarget {
    All,
    Container(String),
}

impl SyncTarget {
    fn label(&self) -> String {
        match self {
            SyncTarget::All => "all".to_string(),
            SyncTarget::Container(name) => name.clone(),
        }
    }
}

struct SyncJob {
    target: SyncTarget,
    trigger: &'static str,
    respond_to: oneshot::Sender<Result<SyncSummary, String>>,
}

/// Per-container entry of the `status` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    /// Unix seconds of the last successful run, 0 before the first one.
    pub last_sync_at_unix: u64,
    /// `ok`, `pending`, or `failed: <error>`.
    pub last_status: String,
    pub created: usize,
    pub removed: usize,
}

impl ContainerStatus {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_sync_at_unix: 0,
            last_status: "pending".to_string(),
            created: 0,
            removed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub container: String,
    pub query: String,
    pub ok: bool,
    pub created: usize,
    pub removed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one processed sync job, returned to `sync` socket callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub target: String,
    pub trigger: String,
    pub tasks: Vec<TaskSummary>,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config_path: &Path, home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config_path.to_path_buf(), home.to_path_buf()))
}

/// Run the daemon runtime until `stop`, ctrl-c, or a fatal task error.
///
/// The settings file must load before anything is spawned; later edits that
/// fail to parse keep the previous settings in place.
pub async fn run(config_path: PathBuf, home: PathBuf) -> Result<(), DaemonError> {
    let root = taskhub_root(&home);
    fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

    let initial = load_settings(config_path.clone()).await?;
    tracing::info!(
        config = %config_path.display(),
        containers = initial.lists.len(),
        interval_minutes = initial.sync_interval,
        "daemon starting",
    );

    let cache: SettingsCache = Arc::new(RwLock::new(initial));
    let status: StatusTable = Arc::new(RwLock::new(BTreeMap::new()));
    let started_at_unix = unix_seconds_now();

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let cache = cache.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = scheduler_task(cache, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let config_path = config_path.clone();
        let cache = cache.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(config_path, cache, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let cache = cache.clone();
        let status = status.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(cache, status, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = SocketContext {
            home: home.clone(),
            config_path: config_path.clone(),
            cache: cache.clone(),
            status: status.clone(),
            sync_tx: sync_tx.clone(),
            shutdown_tx: shutdown.clone(),
            started_at_unix,
        };
        tokio::spawn(async move {
            let result = socket_server_task(context, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(sync_tx);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (scheduler_result, watcher_result, processor_result, socket_result, signal_result) = tokio::join!(
        scheduler_handle,
        watcher_handle,
        processor_handle,
        socket_handle,
        signal_handle
    );

    handle_join("scheduler", scheduler_result)?;
    handle_join("watcher", watcher_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn scheduler_task(
    cache: SettingsCache,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = enqueue_sync(&sync_tx, SyncTarget::All, "scheduler") => match result {
                Ok(summary) => log_summary(&summary),
                Err(DaemonError::ChannelClosed(_)) => break,
                Err(err) => tracing::error!(error = %err, "scheduled sync failed"),
            },
        }

        // Re-read every round so an edited interval applies to the next wait.
        let interval = cache.read().await.sync_interval();
        tracing::debug!(seconds = interval.as_secs(), "next scheduled sync");
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(())
}

async fn watcher_task(
    config_path: PathBuf,
    cache: SettingsCache,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let Some(file_name) = config_path.file_name().map(|name| name.to_os_string()) else {
        return Err(DaemonError::Protocol(format!(
            "config path has no file name: {}",
            config_path.display()
        )));
    };
    let parent = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    // Editors replace the file by rename, so watch the directory, not the file.
    let watch_dir = fs::canonicalize(parent).map_err(|e| io_err(parent, e))?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %watch_dir.display(), "watching config directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                let Some(path) = event
                    .paths
                    .into_iter()
                    .find(|path| is_config_event(path, &file_name))
                else {
                    continue;
                };
                if !should_process_event(&mut debounce, &path, Instant::now()) {
                    continue;
                }

                match load_settings(config_path.clone()).await {
                    Ok(settings) => {
                        tracing::info!(
                            containers = settings.lists.len(),
                            "settings changed, re-syncing",
                        );
                        *cache.write().await = settings;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring invalid settings edit");
                        continue;
                    }
                }

                match enqueue_sync(&sync_tx, SyncTarget::All, "watcher").await {
                    Ok(summary) => log_summary(&summary),
                    Err(DaemonError::ChannelClosed(_)) => break,
                    Err(err) => tracing::error!(error = %err, "watcher-triggered sync failed"),
                }
            }
        }
    }

    Ok(())
}

async fn sync_processor_task(
    cache: SettingsCache,
    status: StatusTable,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();
                tracing::info!(target = %job.target.label(), trigger = job.trigger, "sync started");

                // The watcher owns reloads; an invalid edit leaves the last
                // good settings in the cache.
                let settings = cache.read().await.clone();
                let target = job.target.clone();
                let joined =
                    tokio::task::spawn_blocking(move || run_job_blocking(&settings, &target)).await;

                let outcome = match joined {
                    Ok(Ok(outcomes)) => {
                        record_outcomes(&mut *status.write().await, &outcomes, unix_seconds_now());
                        Ok(build_sync_summary(&job.target, job.trigger, &outcomes, started.elapsed()))
                    }
                    Ok(Err(err)) => Err(err.to_string()),
                    Err(err) => Err(format!("sync task join error: {err}")),
                };
                if let Err(message) = &outcome {
                    tracing::error!(target = %job.target.label(), error = %message, "sync job failed");
                }

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

/// One job: fresh backends, every selected task.
fn run_job_blocking(
    settings: &Settings,
    target: &SyncTarget,
) -> Result<Vec<TaskOutcome>, DaemonError> {
    let tasks = select_tasks(settings, target)?;
    let (source, storage) = taskhub_backends::from_settings(settings)?;
    let options = SyncOptions::from_settings(settings);
    Ok(run_all(&tasks, &source, &storage, &options))
}

fn select_tasks(settings: &Settings, target: &SyncTarget) -> Result<Vec<SyncTask>, DaemonError> {
    let tasks = settings.sync_tasks();
    match target {
        SyncTarget::All => Ok(tasks),
        SyncTarget::Container(name) => {
            let selected: Vec<SyncTask> = tasks
                .into_iter()
                .filter(|task| task.container.as_str() == name)
                .collect();
            if selected.is_empty() {
                return Err(DaemonError::UnknownContainer(name.clone()));
            }
            Ok(selected)
        }
    }
}

fn record_outcomes(table: &mut BTreeMap<String, ContainerStatus>, outcomes: &[TaskOutcome], now: u64) {
    for outcome in outcomes {
        let name = outcome.task.container.as_str();
        let entry = table
            .entry(name.to_string())
            .or_insert_with(|| ContainerStatus::pending(name));
        match &outcome.result {
            Ok(report) => {
                entry.last_sync_at_unix = now;
                entry.last_status = "ok".to_string();
                entry.created = report.created;
                entry.removed = report.removed;
            }
            Err(err) => {
                entry.last_status = format!("failed: {err}");
            }
        }
    }
}

fn build_sync_summary(
    target: &SyncTarget,
    trigger: &'static str,
    outcomes: &[TaskOutcome],
    duration: Duration,
) -> SyncSummary {
    let tasks: Vec<TaskSummary> = outcomes
        .iter()
        .map(|outcome| {
            let (created, removed) = outcome
                .result
                .as_ref()
                .map(|report| (report.created, report.removed))
                .unwrap_or((0, 0));
            TaskSummary {
                container: outcome.task.container.as_str().to_string(),
                query: outcome.task.query.clone(),
                ok: outcome.is_ok(),
                created,
                removed,
                error: outcome.result.as_ref().err().map(ToString::to_string),
            }
        })
        .collect();
    let failed = tasks.iter().filter(|task| !task.ok).count();

    SyncSummary {
        target: target.label(),
        trigger: trigger.to_string(),
        tasks,
        failed,
        duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
    }
}

fn log_summary(summary: &SyncSummary) {
    let created: usize = summary.tasks.iter().map(|task| task.created).sum();
    let removed: usize = summary.tasks.iter().map(|task| task.removed).sum();
    tracing::info!(
        target = %summary.target,
        trigger = %summary.trigger,
        tasks = summary.tasks.len(),
        failed = summary.failed,
        created,
        removed,
        duration_ms = summary.duration_ms,
        "sync completed",
    );
}

struct SocketContext {
    home: PathBuf,
    config_path: PathBuf,
    cache: SettingsCache,
    status: StatusTable,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
}

async fn socket_server_task(
    context: SocketContext,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&context.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening for control requests");

    let context = Arc::new(context);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, &context).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(stream: UnixStream, context: &SocketContext) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                let reply = ControlReply::from(Err(format!("invalid request: {err}")));
                write_reply(&mut writer, &reply).await?;
                continue;
            }
        };

        let stop = request == ControlRequest::Stop;
        let result = match request {
            ControlRequest::Status => {
                let settings = context.cache.read().await;
                let status = context.status.read().await;
                Ok(build_status_payload(
                    &context.home,
                    &context.config_path,
                    &settings,
                    &status,
                    context.started_at_unix,
                ))
            }
            ControlRequest::Sync { container } => {
                let target = container.map_or(SyncTarget::All, SyncTarget::Container);
                enqueue_sync(&context.sync_tx, target, "socket")
                    .await
                    .map(|summary| json!(summary))
                    .map_err(|err| err.to_string())
            }
            ControlRequest::Stop => {
                let _ = context.shutdown_tx.send(());
                Ok(json!({ "stopping": true }))
            }
        };

        write_reply(&mut writer, &ControlReply::from(result)).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

fn build_status_payload(
    home: &Path,
    config_path: &Path,
    settings: &Settings,
    status: &BTreeMap<String, ContainerStatus>,
    started_at_unix: u64,
) -> Value {
    // Configured containers first, then any that were synced before an edit removed them.
    let mut containers: BTreeMap<&str, ContainerStatus> = settings
        .lists
        .keys()
        .map(|name| (name.as_str(), ContainerStatus::pending(name)))
        .collect();
    for (name, entry) in status {
        containers.insert(name.as_str(), entry.clone());
    }

    let last_run_at_unix = status
        .values()
        .map(|entry| entry.last_sync_at_unix)
        .max()
        .unwrap_or(0);

    json!({
        "running": true,
        "started_at_unix": started_at_unix,
        "last_run_at_unix": last_run_at_unix,
        "sync_interval_minutes": settings.sync_interval,
        "containers": containers.into_values().collect::<Vec<_>>(),
        "config": config_path.display().to_string(),
        "socket": socket_path(home).display().to_string(),
    })
}

async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    target: SyncTarget,
    trigger: &'static str,
) -> Result<SyncSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            target,
            trigger,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn load_settings(config_path: PathBuf) -> Result<Settings, DaemonError> {
    tokio::task::spawn_blocking(move || settings::load_from(&config_path))
        .await
        .map_err(|err| DaemonError::Protocol(format!("settings load join error: {err}")))?
        .map_err(DaemonError::from)
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_config_event(path: &Path, config_file_name: &std::ffi::OsStr) -> bool {
    path.file_name() == Some(config_file_name)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

async fn write_reply(writer: &mut OwnedWriteHalf, reply: &ControlReply) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(reply)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global subscriber on stderr: `RUST_LOG` filter (default
/// `info`), JSON lines when `TASKHUB_LOG_FORMAT=json`. Safe to call more
/// than once.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TASKHUB_LOG_FORMAT").is_ok_and(|format| format == "json");
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
