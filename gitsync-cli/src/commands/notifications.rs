//! `git-sync notifications`: toggle desktop notifications in the config.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use gitsync_core::config;

use super::load_config;

#[derive(Subcommand, Debug)]
pub enum NotificationsCommand {
    /// Turn desktop notifications on.
    Enable,
    /// Turn desktop notifications off.
    Disable,
    /// Show whether notifications are on and their timeout.
    Status,
}

pub fn run(command: NotificationsCommand, config_path: Option<&Path>) -> Result<()> {
    let (path, mut cfg) = load_config(config_path)?;

    let wanted = match command {
        NotificationsCommand::Status => {
            let state = if cfg.global.enable_notifications {
                "enabled".green()
            } else {
                "disabled".yellow()
            };
            println!("Desktop notifications: {state}");
            println!("Timeout: {} ms", cfg.global.notification_timeout_ms);
            return Ok(());
        }
        NotificationsCommand::Enable => true,
        NotificationsCommand::Disable => false,
    };

    let label = if wanted { "enabled" } else { "disabled" };
    if cfg.global.enable_notifications == wanted {
        println!("{} Desktop notifications are already {label}", "✓".green());
        return Ok(());
    }

    cfg.global.enable_notifications = wanted;
    config::save_at(&path, &cfg)
        .with_context(|| format!("failed to save config to {}", path.display()))?;
    println!("{} Desktop notifications {label}", "✓".green());
    println!("A running daemon picks this up automatically when it watches the config file.");
    Ok(())
}
