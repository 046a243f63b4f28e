//! Configuration file watching with a trailing debounce.
//!
//! The parent directory is watched rather than the file, since editors and
//! [`gitsync_core::config::save_at`] replace the file by rename. Events are
//! coalesced until the file has been quiet for the debounce window, then
//! the file is parsed and validated. Only a fully valid config is forwarded
//! as [`WatchEvent::Changed`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use gitsync_core::{config, ConfigError, SyncConfig};

use crate::error::{io_err, DaemonError};
use crate::paths::DEBOUNCE_WINDOW;

#[derive(Debug)]
pub enum WatchEvent {
    /// The file changed and the new contents are valid.
    Changed(SyncConfig),
    /// The file changed but could not be loaded; nothing should be applied.
    Rejected(ConfigError),
}

pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: DEBOUNCE_WINDOW,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Watch registration errors are returned here; later
    /// failures are logged by the task.
    pub fn spawn(
        self,
        events: mpsc::Sender<WatchEvent>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<Result<(), DaemonError>>, DaemonError> {
        let dir = watch_dir(&self.path);
        // Canonicalize so reported paths (e.g. /private/var on macOS) match.
        let dir = std::fs::canonicalize(&dir).map_err(|e| io_err(&dir, e))?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| io_err(&self.path, std::io::ErrorKind::InvalidInput.into()))?;

        let (fs_tx, fs_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = fs_tx.send(event);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "watching configuration file");

        let task = WatchTask {
            path: self.path,
            file_name,
            debouncer: Debouncer::new(self.debounce),
            _watcher: watcher,
        };
        Ok(tokio::spawn(task.run(fs_rx, events, shutdown_rx)))
    }
}

struct WatchTask {
    path: PathBuf,
    file_name: std::ffi::OsString,
    debouncer: Debouncer,
    _watcher: RecommendedWatcher,
}

impl WatchTask {
    async fn run(
        mut self,
        mut fs_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
        events: mpsc::Sender<WatchEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = fs_rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Ok(event) if self.is_config_event(&event) => {
                            self.debouncer.touch(Instant::now());
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "config watcher event error"),
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.debouncer.clear();
                    let event = load_checked(self.path.clone()).await;
                    if events.send(event).await.is_err() {
                        return Err(DaemonError::ChannelClosed("config watch events"));
                    }
                }
            }
        }
        tracing::debug!("config watcher stopped");
        Ok(())
    }

    fn is_config_event(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }
}

/// Parse then validate on the blocking pool. Never creates a missing file.
async fn load_checked(path: PathBuf) -> WatchEvent {
    let shown = path.display().to_string();
    let loaded = tokio::task::spawn_blocking(move || {
        let parsed = config::parse_at(&path)?;
        parsed.validate()?;
        Ok::<_, ConfigError>(parsed)
    })
    .await;

    match loaded {
        Ok(Ok(config)) => {
            tracing::info!(path = %shown, "configuration change detected");
            WatchEvent::Changed(config)
        }
        Ok(Err(err)) => {
            tracing::error!(path = %shown, error = %err, "rejected configuration change");
            WatchEvent::Rejected(err)
        }
        Err(err) => {
            let err = ConfigError::Io {
                path: PathBuf::from(shown),
                source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
            };
            WatchEvent::Rejected(err)
        }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Trailing-edge debounce: fires once, `window` after the last touch.
#[derive(Debug, Clone)]
struct Debouncer {
    window: Duration,
    due: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self { window, due: None }
    }

    fn touch(&mut self, now: Instant) {
        self.due = Some(now + self.window);
    }

    fn deadline(&self) -> Option<Instant> {
        self.due
    }

    fn clear(&mut self) {
        self.due = None;
    }

    #[cfg(test)]
    fn is_due(&self, now: Instant) -> bool {
        self.due.map_or(false, |due| now >= due)
    }
}
