//! Error types for gitsync-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Why a single synchronization attempt failed.
///
/// The variant is the failure class; the `Display` text is what ends up in
/// the history record's `error_message`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The working tree is not in a state the attempt can operate on:
    /// unopenable repository, uncommitted changes, missing branch, detached HEAD.
    #[error("{message}")]
    RepositoryState { path: PathBuf, message: String },

    /// Network or protocol failure while talking to the remote.
    #[error("git {op} failed: {source}")]
    GitOperation {
        op: &'static str,
        #[source]
        source: git2::Error,
    },

    /// The remote accepted the connection but refused a ref update.
    #[error("git push rejected for {refname}: {message}")]
    PushRejected { refname: String, message: String },

    /// Local libgit2 failure outside a remote operation (status, refs, checkout).
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

impl SyncError {
    pub(crate) fn state(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SyncError::RepositoryState {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn remote(op: &'static str, source: git2::Error) -> Self {
        SyncError::GitOperation { op, source }
    }

    /// True for failures caused by the local repository rather than the remote.
    pub fn is_repository_state(&self) -> bool {
        matches!(self, SyncError::RepositoryState { .. })
    }
}

/// All errors that can arise from history persistence.
///
/// These never fail a sync: the store logs them and moves on.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The advisory lock could not be taken.
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error for a history record.
    #[error("history JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`HistoryError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> HistoryError {
    HistoryError::Io {
        path: path.into(),
        source,
    }
}
