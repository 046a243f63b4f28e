//! `git-sync check`: validate the config and every target branch.

use std::path::Path;

use anyhow::{bail, Result};
use colored::Colorize;

use gitsync_core::{BranchStrategy, RepositorySyncSpec};
use gitsync_sync::target_branch_exists;

use super::load_config;

pub fn run(config: Option<&Path>) -> Result<()> {
    let (path, config) = load_config(config)?;
    println!("{} config is valid: {}", "✓".green(), path.display());

    let mut problems = 0usize;
    for repo in &config.repositories {
        match check_repository(repo) {
            Ok(note) => println!("{} {} {}", "✓".green(), repo.path.display(), note.bright_black()),
            Err(message) => {
                problems += 1;
                println!("{} {}: {}", "✗".red(), repo.path.display(), message);
            }
        }
    }

    if problems > 0 {
        bail!("{problems} repository check(s) failed");
    }
    Ok(())
}

fn check_repository(repo: &RepositorySyncSpec) -> Result<String, String> {
    if !repo.path.join(".git").exists() && !repo.path.join("HEAD").exists() {
        return Err("not a git repository".to_string());
    }
    if !repo.enabled {
        return Ok("(disabled)".to_string());
    }

    match (repo.branch_strategy, repo.target_branch.as_deref()) {
        (BranchStrategy::Specific, Some(branch)) => {
            match target_branch_exists(&repo.path, &repo.remote, branch) {
                Ok(true) => Ok(format!("(branch '{branch}' found)")),
                Ok(false) => Err(format!(
                    "branch '{branch}' does not exist locally or on '{}'",
                    repo.remote
                )),
                Err(err) => Err(err.to_string()),
            }
        }
        (strategy, _) => Ok(format!("({} {strategy})", repo.direction)),
    }
}
