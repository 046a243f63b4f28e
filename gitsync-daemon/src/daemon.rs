//! Top-level composition of the running daemon.
//!
//! Owns the live configuration and the current scheduler. Reloads (file
//! watcher or SIGHUP) validate first, swap the live snapshot, stop the old
//! scheduler and start a new one sized from the new policy. Shutdown
//! (SIGINT/SIGTERM) stops everything within a fixed deadline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};

use gitsync_core::{config, ConfigError, GlobalSyncPolicy, SyncConfig};
use gitsync_sync::{HistorySettings, HistoryStore, RepoSyncer, SyncEngine};

use crate::error::{io_err, DaemonError};
use crate::live::LiveConfig;
use crate::notifier::{self, NotificationSink};
use crate::paths::{
    self, CLEANUP_INITIAL_DELAY, CLEANUP_INTERVAL, DEBOUNCE_WINDOW, SHUTDOWN_DEADLINE,
};
use crate::scheduler::{RepoSchedule, ScheduleTiming, Scheduler, SyncServices};
use crate::supervisor;
use crate::watcher::{ConfigWatcher, WatchEvent};

/// Timing and wiring knobs; the defaults are what the binary uses.
pub struct DaemonOptions {
    pub timing: ScheduleTiming,
    pub debounce: Duration,
    pub shutdown_deadline: Duration,
    pub cleanup_initial_delay: Duration,
    pub cleanup_interval: Duration,
    pub watch_config: bool,
    /// Overrides `history_cache_dir` and the `~/.cache/git-sync` default.
    pub history_dir: Option<PathBuf>,
    /// Overrides the sink chosen from `enable_notifications`.
    pub notifier: Option<Arc<dyn NotificationSink>>,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            timing: ScheduleTiming::default(),
            debounce: DEBOUNCE_WINDOW,
            shutdown_deadline: SHUTDOWN_DEADLINE,
            cleanup_initial_delay: CLEANUP_INITIAL_DELAY,
            cleanup_interval: CLEANUP_INTERVAL,
            watch_config: true,
            history_dir: None,
            notifier: None,
        }
    }
}

struct Composition {
    scheduler: Scheduler,
    history: Option<Arc<HistoryStore>>,
}

pub struct Daemon {
    config_path: PathBuf,
    live: LiveConfig,
    syncer: Arc<dyn RepoSyncer>,
    options: DaemonOptions,
    current: Mutex<Option<Composition>>,
}

impl Daemon {
    /// `config` must already be valid; it becomes the first live snapshot.
    pub fn new(
        config_path: impl Into<PathBuf>,
        config: SyncConfig,
        syncer: Arc<dyn RepoSyncer>,
        options: DaemonOptions,
    ) -> Result<Self, DaemonError> {
        config.validate().map_err(ConfigError::from)?;
        Ok(Self {
            config_path: config_path.into(),
            live: LiveConfig::new(config),
            syncer,
            options,
            current: Mutex::new(None),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn live(&self) -> &LiveConfig {
        &self.live
    }

    /// Start scheduling the live configuration. No-op if already running.
    pub async fn start(&self) -> Result<(), DaemonError> {
        let mut current = self.current.lock().await;
        if current.is_none() {
            let snapshot = self.live.snapshot().await;
            let mut next = self.compose(&snapshot);
            next.scheduler.start();
            *current = Some(next);
        }
        Ok(())
    }

    /// Validate and apply `config`. On rejection the running schedule is untouched.
    pub async fn reload(&self, config: SyncConfig) -> Result<(), DaemonError> {
        if let Err(err) = config.validate() {
            let err = ConfigError::from(err);
            tracing::error!(error = %err, "configuration reload rejected; keeping current configuration");
            return Err(DaemonError::ConfigReload(err));
        }

        let mut current = self.current.lock().await;
        self.live.swap(config).await;
        if let Some(mut old) = current.take() {
            old.scheduler.stop().await;
        }

        let snapshot = self.live.snapshot().await;
        let mut next = self.compose(&snapshot);
        next.scheduler.start();
        *current = Some(next);
        tracing::info!(
            repositories = snapshot.enabled_repositories().count(),
            "configuration reloaded"
        );
        Ok(())
    }

    /// Re-read the config file and [`reload`](Self::reload) it.
    pub async fn reload_from_disk(&self) -> Result<(), DaemonError> {
        let path = self.config_path.clone();
        let parsed = tokio::task::spawn_blocking(move || config::parse_at(&path))
            .await
            .map_err(|err| DaemonError::Join {
                task: "config_load",
                message: err.to_string(),
            })?;
        match parsed {
            Ok(config) => self.reload(config).await,
            Err(err) => {
                tracing::error!(error = %err, "configuration reload rejected; keeping current configuration");
                Err(DaemonError::ConfigReload(err))
            }
        }
    }

    /// Per-repository schedule of the running scheduler.
    pub async fn status(&self) -> Vec<RepoSchedule> {
        match self.current.lock().await.as_ref() {
            Some(composition) => composition.scheduler.status(),
            None => Vec::new(),
        }
    }

    pub async fn history(&self) -> Option<Arc<HistoryStore>> {
        self.current
            .lock()
            .await
            .as_ref()
            .and_then(|composition| composition.history.clone())
    }

    /// Stop the scheduler (bounded by its grace period).
    pub async fn stop(&self) {
        if let Some(mut composition) = self.current.lock().await.take() {
            composition.scheduler.stop().await;
        }
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self: Arc<Self>) -> Result<(), DaemonError> {
        let mut terminate =
            signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
        let stop = async move {
            tokio::select! {
                _ = terminate.recv() => tracing::info!("received SIGTERM, shutting down daemon"),
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => tracing::info!("received ctrl-c, shutting down daemon"),
                    Err(err) => tracing::error!(error = %err, "ctrl-c handler failed, shutting down daemon"),
                },
            }
        };
        self.run_until(stop).await
    }

    /// Run until `stop` resolves: start scheduling, watch the config, run
    /// retention cleanup, reload on SIGHUP. Then shut down within the deadline.
    pub async fn run_until<F>(self: Arc<Self>, stop: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()> + Send,
    {
        self.start().await?;

        let (shutdown_tx, _) = broadcast::channel::<()>(4);
        let (watch_tx, mut watch_rx) = mpsc::channel::<WatchEvent>(8);

        let watcher_handle = if self.options.watch_config {
            let watcher =
                ConfigWatcher::new(&self.config_path).with_debounce(self.options.debounce);
            match watcher.spawn(watch_tx, shutdown_tx.subscribe()) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    self.stop().await;
                    return Err(err);
                }
            }
        } else {
            drop(watch_tx);
            None
        };
        let mut watching = watcher_handle.is_some();

        let cleanup_handle = {
            let daemon = Arc::clone(&self);
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move { cleanup_task(daemon, shutdown_rx).await })
        };

        let mut hangup = signal(SignalKind::hangup()).map_err(|e| io_err("SIGHUP handler", e))?;

        supervisor::notify_ready();
        tracing::info!(config = %self.config_path.display(), "daemon started");

        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = hangup.recv() => {
                    tracing::info!("received SIGHUP, reloading configuration");
                    let _ = self.reload_from_disk().await;
                }
                event = watch_rx.recv(), if watching => match event {
                    Some(WatchEvent::Changed(config)) => {
                        let _ = self.reload(config).await;
                    }
                    Some(WatchEvent::Rejected(_)) => {
                        tracing::warn!("keeping current configuration");
                    }
                    None => watching = false,
                },
            }
        }

        supervisor::notify_stopping();
        let _ = shutdown_tx.send(());

        let deadline = self.options.shutdown_deadline;
        let graceful = async {
            if let Some(handle) = watcher_handle {
                handle_join("config_watcher", handle.await)?;
            }
            handle_join("history_cleanup", cleanup_handle.await)?;
            self.stop().await;
            Ok::<(), DaemonError>(())
        };
        match tokio::time::timeout(deadline, graceful).await {
            Ok(result) => {
                tracing::info!("daemon stopped");
                result
            }
            Err(_) => {
                tracing::error!(?deadline, "graceful shutdown timed out");
                Err(DaemonError::ShutdownTimeout(deadline))
            }
        }
    }

    fn compose(&self, config: &SyncConfig) -> Composition {
        let history = self.open_history(&config.global);
        let notifier = self
            .options
            .notifier
            .clone()
            .unwrap_or_else(|| notifier::from_policy(&config.global));
        let services = SyncServices {
            syncer: Arc::clone(&self.syncer),
            history: history.clone(),
            notifier,
        };
        Composition {
            scheduler: Scheduler::new(config, services, self.options.timing),
            history,
        }
    }

    /// History is best-effort: a store that cannot be opened is logged and skipped.
    fn open_history(&self, policy: &GlobalSyncPolicy) -> Option<Arc<HistoryStore>> {
        let dir = match &self.options.history_dir {
            Some(dir) => dir.clone(),
            None => match paths::home_dir() {
                Ok(home) => paths::history_dir(policy, &home),
                Err(err) => match &policy.history_cache_dir {
                    Some(dir) => dir.clone(),
                    None => {
                        tracing::error!(error = %err, "history disabled");
                        return None;
                    }
                },
            },
        };
        match HistoryStore::open(&dir, HistorySettings::from_policy(policy)) {
            Ok(store) => Some(Arc::new(store)),
            Err(err) => {
                tracing::error!(dir = %dir.display(), error = %err, "history disabled");
                None
            }
        }
    }
}

async fn cleanup_task(
    daemon: Arc<Daemon>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let first = Instant::now() + daemon.options.cleanup_initial_delay;
    let mut interval = tokio::time::interval_at(first, daemon.options.cleanup_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let Some(history) = daemon.history().await else { continue };
                match tokio::task::spawn_blocking(move || history.clean_old_entries()).await {
                    Ok(Ok(removed)) => tracing::info!(removed, "history cleanup finished"),
                    Ok(Err(err)) => tracing::error!(error = %err, "history cleanup failed"),
                    Err(err) => tracing::error!(error = %err, "history cleanup task failed"),
                }
            }
        }
    }
    Ok(())
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}

/// Blocking entry point used by `git-sync daemon`.
pub fn start_blocking(config_path: Option<&Path>) -> Result<(), DaemonError> {
    let path = config::resolve_config_path(config_path)?;
    let config = config::load_at(&path)?;
    init_tracing(&config.global.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async move {
        let daemon = Daemon::new(
            path,
            config,
            Arc::new(SyncEngine::new()),
            DaemonOptions::default(),
        )?;
        Arc::new(daemon).run().await
    })
}

/// `RUST_LOG` wins; otherwise `default_level`. `GIT_SYNC_LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("GIT_SYNC_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}
