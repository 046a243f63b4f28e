//! git-sync: keep local git repositories in sync with their remotes.
//!
//! # Usage
//!
//! ```text
//! git-sync [--config <path>] daemon
//! git-sync [--config <path>] history [--limit N] [--repo PATH] [--failed] [--format table|json] [--watch]
//! git-sync [--config <path>] status
//! git-sync [--config <path>] check
//! git-sync [--config <path>] notifications enable|disable|status
//! git-sync [--config <path>] install-daemon [--start]
//! git-sync uninstall-daemon
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    history::HistoryArgs, install::InstallArgs, notifications::NotificationsCommand,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "git-sync",
    version,
    about = "Periodically push and pull local git repositories",
    long_about = None,
)]
struct Cli {
    /// Configuration file (default: ~/.config/git-sync/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync daemon in the foreground.
    Daemon,

    /// Show recorded sync attempts, newest first.
    History(HistoryArgs),

    /// Show configured repositories and whether the service is running.
    Status,

    /// Validate the configuration and every target branch.
    Check,

    /// Enable, disable or inspect desktop notifications.
    Notifications {
        #[command(subcommand)]
        command: NotificationsCommand,
    },

    /// Install and enable the systemd user service.
    InstallDaemon(InstallArgs),

    /// Stop, disable and remove the systemd user service.
    UninstallDaemon,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Daemon => commands::daemon::run(config),
        Commands::History(args) => args.run(config),
        Commands::Status => commands::status::run(config),
        Commands::Check => commands::check::run(config),
        Commands::Notifications { command } => commands::notifications::run(command, config),
        Commands::InstallDaemon(args) => args.run(config),
        Commands::UninstallDaemon => commands::install::uninstall(),
    }
}
