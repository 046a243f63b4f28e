//! YAML configuration store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.config/git-sync/
//!   config.yaml        (global policy + repository list)
//!   config.yaml.tmp    (transient, only during save)
//! ```
//!
//! # API pattern
//!
//! Every function that touches disk has two forms:
//! - `fn_at(path: &Path, …)`: explicit file; used in tests with `TempDir`
//! - `fn(…)`: resolves the default path from `dirs::home_dir()`, delegates to `_at`
//!
//! Loading never returns an unvalidated config: a file that parses but fails
//! [`SyncConfig::validate`] is reported as [`ConfigError::Validation`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError, ValidationError};
use crate::types::{BranchStrategy, SyncConfig};

/// Lowest accepted per-repository interval, in seconds.
pub const MIN_INTERVAL_SECS: u64 = 30;
/// Highest accepted per-repository interval, in seconds (24 hours).
pub const MAX_INTERVAL_SECS: u64 = 86_400;
/// Highest accepted `history_retention_days` (about 100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.config/git-sync/config.yaml`: pure, no I/O.
pub fn default_config_path_at(home: &Path) -> PathBuf {
    home.join(".config").join("git-sync").join(CONFIG_FILE)
}

/// Explicit path if given, otherwise the platform default.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(default_config_path_at(&home()?)),
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load, default-fill, and validate the config at `path`.
///
/// A missing file is created with defaults and an empty repository list.
/// Repeated loads of an unmodified file return equal values.
pub fn load_at(path: &Path) -> Result<SyncConfig, ConfigError> {
    if !path.exists() {
        let config = SyncConfig::default();
        save_at(path, &config)?;
        return Ok(config);
    }
    let config = parse_at(path)?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper for the default path.
pub fn load() -> Result<SyncConfig, ConfigError> {
    load_at(&resolve_config_path(None)?)
}

/// Parse without validating. Defaults are filled by serde.
pub fn parse_at(path: &Path) -> Result<SyncConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_str(contents: &str) -> Result<SyncConfig, serde_yaml::Error> {
    // An empty file deserializes as YAML null; treat it as all defaults.
    if contents.trim().is_empty() {
        return Ok(SyncConfig::default());
    }
    serde_yaml::from_str(contents)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `path`.
///
/// Write flow: serialize → `<name>.tmp` sibling → `rename`.
pub fn save_at(path: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| CONFIG_FILE.to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper for the default path.
pub fn save(config: &SyncConfig) -> Result<(), ConfigError> {
    save_at(&resolve_config_path(None)?, config)
}

// ---------------------------------------------------------------------------
// 4. Validation
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Reject the whole config on the first invalid value.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let global = &self.global;
        if global.max_concurrent_syncs < 1 {
            return Err(ValidationError::global(
                "max_concurrent_syncs must be at least 1",
            ));
        }
        validate_interval(global.default_interval)
            .map_err(|msg| ValidationError::global(format!("default_interval: {msg}")))?;
        if global.history_retention_days > MAX_RETENTION_DAYS {
            return Err(ValidationError::global(format!(
                "history_retention_days: {} is too high: maximum is {MAX_RETENTION_DAYS} days",
                global.history_retention_days
            )));
        }

        let mut seen = HashSet::new();
        for (index, repo) in self.repositories.iter().enumerate() {
            if repo.path.as_os_str().is_empty() {
                return Err(ValidationError::repository(index, "path cannot be empty"));
            }
            if !repo.path.is_absolute() {
                return Err(ValidationError::repository(
                    index,
                    format!("path '{}' must be absolute", repo.path.display()),
                ));
            }
            if !seen.insert(repo.path.clone()) {
                return Err(ValidationError::repository(
                    index,
                    format!("duplicate repository path '{}'", repo.path.display()),
                ));
            }
            if repo.remote.trim().is_empty() {
                return Err(ValidationError::repository(index, "remote cannot be empty"));
            }
            validate_interval(repo.interval_secs(global))
                .map_err(|msg| ValidationError::repository(index, format!("interval: {msg}")))?;

            let target = repo.target_branch.as_deref().filter(|b| !b.is_empty());
            match (repo.branch_strategy, target) {
                (BranchStrategy::Specific, None) => {
                    return Err(ValidationError::repository(
                        index,
                        "target_branch is required for the 'specific' strategy",
                    ));
                }
                (BranchStrategy::Specific, Some(branch)) => {
                    validate_branch_name(branch)
                        .map_err(|msg| ValidationError::repository(index, msg))?;
                }
                (other, Some(_)) => {
                    return Err(ValidationError::repository(
                        index,
                        format!("target_branch must be empty for the '{other}' strategy"),
                    ));
                }
                (_, None) => {}
            }
        }
        Ok(())
    }
}

/// Check an interval against [`MIN_INTERVAL_SECS`, `MAX_INTERVAL_SECS`].
pub fn validate_interval(secs: u64) -> Result<(), String> {
    if secs < MIN_INTERVAL_SECS {
        return Err(format!(
            "{secs}s is too low: minimum is {MIN_INTERVAL_SECS} seconds"
        ));
    }
    if secs > MAX_INTERVAL_SECS {
        return Err(format!(
            "{secs}s is too high: maximum is {MAX_INTERVAL_SECS} seconds (24 hours)"
        ));
    }
    Ok(())
}

/// Subset of git's ref-name rules that catches typos in hand-edited configs.
pub fn validate_branch_name(branch: &str) -> Result<(), String> {
    if branch.starts_with('-') || branch.ends_with(".lock") {
        return Err(format!("invalid branch name '{branch}'"));
    }
    for bad in [" ", "~", "^", ":", "?", "*", "[", "\\", "..", "//", "@{"] {
        if branch.contains(bad) {
            return Err(format!(
                "branch name '{branch}' contains invalid sequence '{bad}'"
            ));
        }
    }
    if branch.starts_with('/') || branch.ends_with('/') {
        return Err(format!("branch name '{branch}' cannot start or end with '/'"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
