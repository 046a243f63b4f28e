//! `git-sync status`: configured repositories and service state.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gitsync_core::SyncConfig;

use super::load_config;

#[derive(Tabled)]
struct RepositoryRow {
    #[tabled(rename = "repository")]
    path: String,
    #[tabled(rename = "enabled")]
    enabled: String,
    #[tabled(rename = "direction")]
    direction: String,
    #[tabled(rename = "interval")]
    interval: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "branches")]
    branches: String,
}

pub fn run(config: Option<&Path>) -> Result<()> {
    let (path, config) = load_config(config)?;

    let service = if gitsync_daemon::systemd::is_active() {
        "running".green()
    } else {
        "not running".yellow()
    };
    println!(
        "git-sync v{} | config {} | service {}",
        env!("CARGO_PKG_VERSION"),
        path.display(),
        service,
    );
    println!(
        "{} repositories ({} enabled) | max {} concurrent syncs",
        config.repositories.len(),
        config.enabled_repositories().count(),
        config.global.max_concurrent_syncs,
    );

    if config.repositories.is_empty() {
        println!("No repositories configured. Add entries under 'repositories:' in the config file.");
        return Ok(());
    }
    println!("{}", Table::new(rows(&config)).with(Style::rounded()));
    Ok(())
}

fn rows(config: &SyncConfig) -> Vec<RepositoryRow> {
    config
        .repositories
        .iter()
        .map(|repo| RepositoryRow {
            path: repo.path.display().to_string(),
            enabled: if repo.enabled { "yes" } else { "no" }.to_string(),
            direction: repo.direction.to_string(),
            interval: format!("{}s", repo.interval_secs(&config.global)),
            remote: repo.remote.clone(),
            branches: match &repo.target_branch {
                Some(branch) => format!("{} ({branch})", repo.branch_strategy),
                None => repo.branch_strategy.to_string(),
            },
        })
        .collect()
}
