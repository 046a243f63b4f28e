use std::path::PathBuf;
use std::time::Duration;

use gitsync_core::ConfigError;
use thiserror::Error;

/// Error surface for the daemon runtime, config watching, and systemd management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A reloaded configuration was rejected; the previous one stays live.
    #[error("config reload rejected: {0}")]
    ConfigReload(#[source] ConfigError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },

    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("systemd error: {0}")]
    Systemd(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
