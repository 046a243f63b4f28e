//! git-sync core library: domain types, configuration store, errors.
//!
//! Public API surface:
//! - [`types`]: repository specs, global policy, sync outcomes
//! - [`error`]: [`ConfigError`], [`ValidationError`]
//! - [`config`]: load / save / validate

pub mod config;
pub mod error;
pub mod types;

pub use error::{ConfigError, ValidationError};
pub use types::{
    BranchStrategy, Direction, GlobalSyncPolicy, RepositorySyncSpec, SyncConfig, SyncOutcome,
    SyncStatus,
};
