pub mod check;
pub mod daemon;
pub mod history;
pub mod install;
pub mod notifications;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gitsync_core::{config, SyncConfig};

/// Resolve and load the configuration, creating a default file if missing.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, SyncConfig)> {
    let path = config::resolve_config_path(explicit).context("could not resolve config path")?;
    let loaded = config::load_at(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    Ok((path, loaded))
}
