//! Branch inspection and the checkout-operate-restore guard used by the
//! `specific` strategy.

use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{BranchType, ErrorCode, Repository, StatusOptions};

use crate::error::SyncError;

/// Short name of the checked-out branch. Unborn branches are reported by name.
pub(crate) fn current_branch(repo: &Repository, path: &Path) -> Result<String, SyncError> {
    if repo.head_detached()? {
        return Err(SyncError::state(
            path,
            "HEAD is detached; a checked-out branch is required",
        ));
    }
    let head = repo.find_reference("HEAD")?;
    let target = head
        .symbolic_target()
        .ok_or_else(|| SyncError::state(path, "HEAD does not point at a branch"))?;
    Ok(target.trim_start_matches("refs/heads/").to_string())
}

/// True when there are no staged, unstaged, or untracked changes.
pub(crate) fn is_clean(repo: &Repository) -> Result<bool, SyncError> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .include_ignored(false)
        .exclude_submodules(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(statuses.is_empty())
}

pub(crate) fn ensure_clean(repo: &Repository, path: &Path) -> Result<(), SyncError> {
    if is_clean(repo)? {
        Ok(())
    } else {
        Err(SyncError::state(
            path,
            "repository has uncommitted changes; commit or stash them first",
        ))
    }
}

/// Safe checkout of a local branch: fails instead of overwriting local edits.
pub(crate) fn checkout_branch(repo: &Repository, branch: &str) -> Result<(), SyncError> {
    let refname = format!("refs/heads/{branch}");
    let target = repo.revparse_single(&refname)?;
    repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
    repo.set_head(&refname)?;
    Ok(())
}

/// Run `op` with `target` checked out, then return to the original branch.
///
/// When already on `target`, `op` runs directly. Otherwise the working tree
/// must be clean, whatever the repository's `safety_checks` setting. The
/// result is always `op`'s result; a failed restore is only logged.
pub(crate) fn with_branch<T>(
    repo: &Repository,
    path: &Path,
    remote: &str,
    target: &str,
    op: impl FnOnce() -> Result<T, SyncError>,
) -> Result<T, SyncError> {
    let original = current_branch(repo, path)?;
    if original == target {
        return op();
    }
    if !is_clean(repo)? {
        return Err(SyncError::state(
            path,
            format!("cannot switch to branch '{target}': uncommitted changes in working tree"),
        ));
    }

    let switch = BranchSwitch::enter(repo, path, remote, original, target)?;
    let result = op();
    drop(switch);
    result
}

/// Restores the recorded branch when dropped, on every exit path.
struct BranchSwitch<'r> {
    repo: &'r Repository,
    path: &'r Path,
    original: String,
}

impl<'r> BranchSwitch<'r> {
    fn enter(
        repo: &'r Repository,
        path: &'r Path,
        remote: &str,
        original: String,
        target: &str,
    ) -> Result<Self, SyncError> {
        ensure_local_branch(repo, path, remote, target)?;
        checkout_branch(repo, target)?;
        tracing::debug!(
            "{}: switched from '{}' to '{}'",
            path.display(),
            original,
            target
        );
        Ok(Self {
            repo,
            path,
            original,
        })
    }
}

impl Drop for BranchSwitch<'_> {
    fn drop(&mut self) {
        match checkout_branch(self.repo, &self.original) {
            Ok(()) => tracing::debug!(
                "{}: restored branch '{}'",
                self.path.display(),
                self.original
            ),
            Err(e) => tracing::error!(
                "{}: failed to switch back to branch '{}': {}",
                self.path.display(),
                self.original,
                e
            ),
        }
    }
}

/// Create a local tracking branch from `<remote>/<branch>` if no local one exists.
fn ensure_local_branch(
    repo: &Repository,
    path: &Path,
    remote: &str,
    branch: &str,
) -> Result<(), SyncError> {
    match repo.find_branch(branch, BranchType::Local) {
        Ok(_) => return Ok(()),
        Err(e) if e.code() == ErrorCode::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let upstream = format!("{remote}/{branch}");
    let remote_branch = repo.find_branch(&upstream, BranchType::Remote).map_err(|_| {
        SyncError::state(
            path,
            format!("branch '{branch}' does not exist locally or on remote '{remote}'"),
        )
    })?;
    let commit = remote_branch.get().peel_to_commit()?;
    let mut local = repo.branch(branch, &commit, false)?;
    local.set_upstream(Some(&upstream))?;
    tracing::info!(
        "{}: created local branch '{}' tracking '{}'",
        path.display(),
        branch,
        upstream
    );
    Ok(())
}

/// Local branch `branch`, or the remote-tracking ref `<remote>/<branch>`.
pub(crate) fn branch_exists(repo: &Repository, remote: &str, branch: &str) -> bool {
    repo.find_branch(branch, BranchType::Local).is_ok()
        || repo
            .find_branch(&format!("{remote}/{branch}"), BranchType::Remote)
            .is_ok()
}
