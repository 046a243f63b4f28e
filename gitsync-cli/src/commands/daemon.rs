//! `git-sync daemon`: foreground daemon process.

use std::path::Path;

use anyhow::{Context, Result};

use gitsync_daemon::start_blocking;

pub fn run(config: Option<&Path>) -> Result<()> {
    start_blocking(config).context("daemon exited with error")
}
