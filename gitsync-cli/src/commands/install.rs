//! `git-sync install-daemon` / `uninstall-daemon`: systemd user service.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use gitsync_daemon::{install_systemd, uninstall_systemd};

/// Arguments for `git-sync install-daemon`.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Start (or restart) the service right away.
    #[arg(long)]
    pub start: bool,
}

impl InstallArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let binary = std::env::current_exe().context("could not locate the git-sync binary")?;
        let config = match config {
            Some(path) => Some(
                std::fs::canonicalize(path)
                    .with_context(|| format!("config file {} not found", path.display()))?,
            ),
            None => None,
        };

        let unit = install_systemd(&home, &binary, config.as_deref(), self.start)
            .context("failed to install systemd service")?;
        println!("installed systemd service: {}", unit.display());
        if self.start {
            println!("service started");
        } else {
            println!("start it with: systemctl --user start git-sync-daemon");
        }
        Ok(())
    }
}

pub fn uninstall() -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    uninstall_systemd(&home).context("failed to uninstall systemd service")?;
    println!("uninstalled systemd service");
    Ok(())
}
