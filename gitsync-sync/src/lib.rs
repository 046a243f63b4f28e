//! # gitsync-sync
//!
//! Repository synchronization and the sync history log.
//!
//! [`SyncEngine`] runs one push/pull attempt for a [`RepositorySyncSpec`];
//! [`HistoryStore`] persists every [`SyncOutcome`] as a JSON line guarded by an
//! advisory file lock.
//!
//! [`RepositorySyncSpec`]: gitsync_core::RepositorySyncSpec
//! [`SyncOutcome`]: gitsync_core::SyncOutcome

mod branch;
pub mod engine;
pub mod error;
pub mod history;
pub mod lock;

pub use engine::{target_branch_exists, RepoSyncer, SyncEngine};
pub use error::{HistoryError, SyncError};
pub use history::{HistoryQuery, HistorySettings, HistoryStore};
pub use lock::FileLock;
