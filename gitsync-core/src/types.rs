//! Domain types for git-sync.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Enumerations are closed sets serialized in lowercase, so an unknown tag is
//! rejected when the configuration is parsed rather than when a sync runs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which way a repository is synchronized with its remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Push,
    Pull,
    #[default]
    Both,
}

impl Direction {
    /// True when the direction writes to the remote.
    pub fn includes_push(self) -> bool {
        matches!(self, Direction::Push | Direction::Both)
    }

    /// True when the direction reads from the remote.
    pub fn includes_pull(self) -> bool {
        matches!(self, Direction::Pull | Direction::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Push => write!(f, "push"),
            Direction::Pull => write!(f, "pull"),
            Direction::Both => write!(f, "both"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "push" => Ok(Direction::Push),
            "pull" => Ok(Direction::Pull),
            "both" => Ok(Direction::Both),
            other => Err(format!(
                "invalid direction '{other}': must be push, pull, or both"
            )),
        }
    }
}

/// Which branch(es) an attempt operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BranchStrategy {
    /// Whatever branch is checked out.
    #[default]
    Current,
    /// Always `main`.
    Main,
    /// Every branch in one operation.
    All,
    /// `target_branch`, switching to it and back if needed.
    Specific,
}

impl fmt::Display for BranchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchStrategy::Current => write!(f, "current"),
            BranchStrategy::Main => write!(f, "main"),
            BranchStrategy::All => write!(f, "all"),
            BranchStrategy::Specific => write!(f, "specific"),
        }
    }
}

impl FromStr for BranchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "current" => Ok(BranchStrategy::Current),
            "main" => Ok(BranchStrategy::Main),
            "all" => Ok(BranchStrategy::All),
            "specific" => Ok(BranchStrategy::Specific),
            other => Err(format!(
                "invalid branch strategy '{other}': must be current, main, all, or specific"
            )),
        }
    }
}

/// Result of one completed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration structs
// ---------------------------------------------------------------------------

/// One configured repository. The absolute `path` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySyncSpec {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub direction: Direction,
    /// Seconds between attempts. `None` falls back to the global default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub branch_strategy: BranchStrategy,
    /// Required iff `branch_strategy` is `specific`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(default = "default_true")]
    pub safety_checks: bool,
    #[serde(default)]
    pub force_push: bool,
}

impl RepositorySyncSpec {
    /// A spec with every optional field at its default.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            direction: Direction::default(),
            interval: None,
            remote: default_remote(),
            branch_strategy: BranchStrategy::default(),
            target_branch: None,
            safety_checks: true,
            force_push: false,
        }
    }

    /// Effective interval in seconds, resolving the global fallback.
    pub fn interval_secs(&self, policy: &GlobalSyncPolicy) -> u64 {
        self.interval.unwrap_or(policy.default_interval)
    }

    /// Short display name: the last path component.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSyncPolicy {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_interval")]
    pub default_interval: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_syncs: usize,
    #[serde(default = "default_history_max_entries")]
    pub history_max_entries: usize,
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_cache_dir: Option<PathBuf>,
    #[serde(default = "default_history_max_file_size_mb")]
    pub history_max_file_size_mb: u64,
    #[serde(default = "default_true")]
    pub enable_notifications: bool,
    #[serde(default = "default_notification_timeout_ms")]
    pub notification_timeout_ms: u64,
}

impl Default for GlobalSyncPolicy {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_interval: default_interval(),
            max_concurrent_syncs: default_max_concurrent(),
            history_max_entries: default_history_max_entries(),
            history_retention_days: default_history_retention_days(),
            history_cache_dir: None,
            history_max_file_size_mb: default_history_max_file_size_mb(),
            enable_notifications: true,
            notification_timeout_ms: default_notification_timeout_ms(),
        }
    }
}

impl GlobalSyncPolicy {
    /// Rotation threshold in bytes.
    pub fn history_max_file_bytes(&self) -> u64 {
        self.history_max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Root of the YAML configuration file: the full `(policy, repositories)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub global: GlobalSyncPolicy,
    #[serde(default)]
    pub repositories: Vec<RepositorySyncSpec>,
}

impl SyncConfig {
    /// Repositories that take part in scheduling.
    pub fn enabled_repositories(&self) -> impl Iterator<Item = &RepositorySyncSpec> {
        self.repositories.iter().filter(|r| r.enabled)
    }
}

// ---------------------------------------------------------------------------
// Outcome record
// ---------------------------------------------------------------------------

/// Immutable record of one completed attempt; one JSON line in the history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub timestamp: DateTime<Utc>,
    pub repo_path: PathBuf,
    pub direction: Direction,
    pub status: SyncStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SyncOutcome {
    /// Build an outcome stamped with the current time.
    pub fn completed(
        repo_path: impl Into<PathBuf>,
        direction: Direction,
        duration: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            repo_path: repo_path.into(),
            direction,
            status: if error.is_some() {
                SyncStatus::Failed
            } else {
                SyncStatus::Success
            },
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            error_message: error,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn is_failed(&self) -> bool {
        self.status == SyncStatus::Failed
    }
}

// ---------------------------------------------------------------------------
// serde defaults
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    5
}

fn default_history_max_entries() -> usize {
    1000
}

fn default_history_retention_days() -> u32 {
    30
}

fn default_history_max_file_size_mb() -> u64 {
    10
}

fn default_notification_timeout_ms() -> u64 {
    5000
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
