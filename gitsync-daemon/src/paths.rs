use std::path::{Path, PathBuf};
use std::time::Duration;

use gitsync_core::GlobalSyncPolicy;

use crate::error::DaemonError;

pub const APP_NAME: &str = "git-sync";
pub const SYSTEMD_UNIT: &str = "git-sync-daemon.service";

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
pub const INITIAL_SYNC_DELAY: Duration = Duration::from_secs(10);
pub const SCHEDULER_STOP_GRACE: Duration = Duration::from_secs(5);
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);
pub const CLEANUP_INITIAL_DELAY: Duration = Duration::from_secs(60 * 60);
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn home_dir() -> Result<PathBuf, DaemonError> {
    dirs::home_dir().ok_or(DaemonError::HomeNotFound)
}

pub fn cache_dir(home: &Path) -> PathBuf {
    home.join(".cache").join(APP_NAME)
}

/// `history_cache_dir` from the policy, or `~/.cache/git-sync`.
pub fn history_dir(policy: &GlobalSyncPolicy, home: &Path) -> PathBuf {
    policy
        .history_cache_dir
        .clone()
        .unwrap_or_else(|| cache_dir(home))
}

pub fn systemd_user_dir(home: &Path) -> PathBuf {
    home.join(".config").join("systemd").join("user")
}

pub fn systemd_unit_path(home: &Path) -> PathBuf {
    systemd_user_dir(home).join(SYSTEMD_UNIT)
}
