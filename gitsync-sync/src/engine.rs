//! One synchronization attempt for one repository.
//!
//! Flow: open → safety check → dispatch on [`Direction`] → dispatch on
//! [`BranchStrategy`]. `both` pulls first and never pushes after a failed pull.

use std::cell::{Cell, RefCell};
use std::path::Path;

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Cred, ErrorCode, FetchOptions, PushOptions, Reference, RemoteCallbacks,
    Repository,
};
use gitsync_core::{BranchStrategy, Direction, RepositorySyncSpec};

use crate::branch::{self, current_branch};
use crate::error::SyncError;

const MAIN_BRANCH: &str = "main";
const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Anything that can run a sync attempt. The scheduler only sees this trait.
pub trait RepoSyncer: Send + Sync {
    /// Blocking; called from a worker thread.
    fn sync(&self, spec: &RepositorySyncSpec) -> Result<(), SyncError>;
}

/// libgit2-backed [`RepoSyncer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncEngine;

impl SyncEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RepoSyncer for SyncEngine {
    fn sync(&self, spec: &RepositorySyncSpec) -> Result<(), SyncError> {
        let path = spec.path.as_path();
        let repo = Repository::open(path).map_err(|e| {
            SyncError::state(
                path,
                format!("failed to open repository at {}: {}", path.display(), e.message()),
            )
        })?;

        if spec.safety_checks {
            let forced = spec.force_push && spec.direction == Direction::Push;
            if !forced {
                branch::ensure_clean(&repo, path)?;
            } else if !branch::is_clean(&repo)? {
                tracing::warn!(
                    "{}: pushing with uncommitted changes because force_push is set",
                    path.display()
                );
            }
        }

        let attempt = Attempt { repo: &repo, spec };
        // Pull first; a failed pull never reaches the push.
        if spec.direction.includes_pull() {
            attempt.pull()?;
        }
        if spec.direction.includes_push() {
            attempt.push()?;
        }
        Ok(())
    }
}

/// Whether `branch` exists locally or as `<remote>/<branch>` in the repo at `path`.
pub fn target_branch_exists(path: &Path, remote: &str, branch: &str) -> Result<bool, SyncError> {
    let repo = Repository::open(path).map_err(|e| {
        SyncError::state(
            path,
            format!("failed to open repository at {}: {}", path.display(), e.message()),
        )
    })?;
    Ok(branch::branch_exists(&repo, remote, branch))
}

struct Attempt<'a> {
    repo: &'a Repository,
    spec: &'a RepositorySyncSpec,
}

impl Attempt<'_> {
    fn path(&self) -> &Path {
        &self.spec.path
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    fn push(&self) -> Result<(), SyncError> {
        match self.spec.branch_strategy {
            BranchStrategy::Current => {
                let name = current_branch(self.repo, self.path())?;
                self.push_branches(&[name])
            }
            BranchStrategy::Main => {
                self.require_local(MAIN_BRANCH)?;
                self.push_branches(&[MAIN_BRANCH.to_string()])
            }
            BranchStrategy::All => {
                let names = self.local_branches()?;
                if names.is_empty() {
                    return Err(SyncError::state(self.path(), "no local branches to push"));
                }
                self.push_branches(&names)
            }
            BranchStrategy::Specific => {
                let target = self.target()?;
                branch::with_branch(self.repo, self.path(), &self.spec.remote, target, || {
                    self.push_branches(&[target.to_string()])
                })
            }
        }
    }

    /// One push call carrying a refspec per branch.
    fn push_branches(&self, names: &[String]) -> Result<(), SyncError> {
        let force = self.spec.force_push;
        if force {
            tracing::warn!(
                "{}: force pushing {} to '{}'",
                self.path().display(),
                names.join(", "),
                self.spec.remote
            );
        }
        let refspecs: Vec<String> = names
            .iter()
            .map(|name| {
                let prefix = if force { "+" } else { "" };
                format!("{prefix}refs/heads/{name}:refs/heads/{name}")
            })
            .collect();

        let mut remote = self.find_remote()?;
        let rejected: RefCell<Option<(String, String)>> = RefCell::new(None);
        {
            let mut callbacks = remote_callbacks(self.repo);
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejected.borrow_mut() = Some((refname.to_string(), message.to_string()));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote
                .push(&refspecs, Some(&mut options))
                .map_err(|e| SyncError::remote("push", e))?;
        }

        if let Some((refname, message)) = rejected.into_inner() {
            return Err(SyncError::PushRejected { refname, message });
        }
        tracing::debug!(
            "{}: pushed {} to '{}'",
            self.path().display(),
            names.join(", "),
            self.spec.remote
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pull
    // -----------------------------------------------------------------------

    fn pull(&self) -> Result<(), SyncError> {
        match self.spec.branch_strategy {
            BranchStrategy::Current => {
                let name = current_branch(self.repo, self.path())?;
                self.pull_branch(&name)
            }
            BranchStrategy::Main => self.pull_branch(MAIN_BRANCH),
            BranchStrategy::All => self.fetch(&[]),
            BranchStrategy::Specific => {
                let target = self.target()?;
                branch::with_branch(self.repo, self.path(), &self.spec.remote, target, || {
                    self.pull_branch(target)
                })
            }
        }
    }

    /// Fetch `name` and fast-forward the local branch to it.
    ///
    /// A branch the remote does not have (including an empty remote) is a
    /// no-op. A diverged branch is an error; nothing is merged.
    fn pull_branch(&self, name: &str) -> Result<(), SyncError> {
        let remote_name = &self.spec.remote;
        let tracking = format!("refs/remotes/{remote_name}/{name}");
        // Wildcard so a branch the remote lacks is simply not fetched.
        self.fetch(&[format!("+refs/heads/*:refs/remotes/{remote_name}/*")])?;

        let remote_ref = match self.repo.find_reference(&tracking) {
            Ok(r) => r,
            Err(e) if e.code() == ErrorCode::NotFound => {
                tracing::debug!(
                    "{}: '{}' has no branch '{}', nothing to pull",
                    self.path().display(),
                    remote_name,
                    name
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let incoming = self.repo.reference_to_annotated_commit(&remote_ref)?;
        let target = incoming.id();

        let local_name = format!("refs/heads/{name}");
        let mut local_ref = match self.repo.find_reference(&local_name) {
            Ok(r) => r,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return self.create_from_remote(name, &remote_ref);
            }
            Err(e) => return Err(e.into()),
        };

        let (analysis, _) = self
            .repo
            .merge_analysis_for_ref(&local_ref, &[&incoming])?;
        if analysis.is_up_to_date() {
            tracing::debug!("{}: '{}' already up to date", self.path().display(), name);
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            return Err(SyncError::remote(
                "pull",
                git2::Error::from_str(&format!(
                    "branch '{name}' has diverged from '{remote_name}/{name}'; fast-forward not possible"
                )),
            ));
        }

        let checked_out = current_branch(self.repo, self.path()).ok().as_deref() == Some(name);
        if checked_out {
            let commit = self.repo.find_object(target, None)?;
            self.repo
                .checkout_tree(&commit, Some(CheckoutBuilder::new().safe()))?;
        }
        local_ref.set_target(target, &format!("git-sync: fast-forward {name}"))?;
        tracing::debug!(
            "{}: fast-forwarded '{}' to {}",
            self.path().display(),
            name,
            target
        );
        Ok(())
    }

    /// Local branch missing (e.g. unborn HEAD or no local `main`): point it at
    /// the remote commit and set its upstream.
    fn create_from_remote(&self, name: &str, remote_ref: &Reference<'_>) -> Result<(), SyncError> {
        let commit = remote_ref.peel_to_commit()?;
        let mut local = self.repo.branch(name, &commit, false)?;
        local.set_upstream(Some(&format!("{}/{}", self.spec.remote, name)))?;
        if current_branch(self.repo, self.path()).ok().as_deref() == Some(name) {
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().safe().recreate_missing(true)))?;
        }
        Ok(())
    }

    fn fetch(&self, refspecs: &[String]) -> Result<(), SyncError> {
        let mut remote = self.find_remote()?;
        let mut options = FetchOptions::new();
        options.remote_callbacks(remote_callbacks(self.repo));
        remote
            .fetch(refspecs, Some(&mut options), None)
            .map_err(|e| SyncError::remote("fetch", e))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn find_remote(&self) -> Result<git2::Remote<'_>, SyncError> {
        self.repo.find_remote(&self.spec.remote).map_err(|e| {
            SyncError::state(
                self.path(),
                format!("remote '{}' not found: {}", self.spec.remote, e.message()),
            )
        })
    }

    fn target(&self) -> Result<&str, SyncError> {
        self.spec
            .target_branch
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                SyncError::state(self.path(), "the 'specific' strategy needs a target_branch")
            })
    }

    fn require_local(&self, name: &str) -> Result<(), SyncError> {
        self.repo
            .find_branch(name, BranchType::Local)
            .map(|_| ())
            .map_err(|_| SyncError::state(self.path(), format!("branch '{name}' does not exist")))
    }

    fn local_branches(&self) -> Result<Vec<String>, SyncError> {
        let mut names = Vec::new();
        for entry in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Credentials from the ssh agent or git's credential helper, giving up
/// after a few rounds instead of letting libgit2 retry forever.
fn remote_callbacks<'a>(repo: &Repository) -> RemoteCallbacks<'a> {
    let config = repo.config().ok();
    let attempts = Cell::new(0u32);
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts.set(attempts.get() + 1);
        if attempts.get() > MAX_AUTH_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }
        if allowed.is_ssh_key() {
            if let Some(user) = username_from_url {
                return Cred::ssh_key_from_agent(user);
            }
        }
        if allowed.is_user_pass_plaintext() {
            if let Some(cfg) = config.as_ref() {
                if let Ok(cred) = Cred::credential_helper(cfg, url, username_from_url) {
                    return Ok(cred);
                }
            }
        }
        Cred::default()
    });
    callbacks
}
