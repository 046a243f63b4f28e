//! Error types for gitsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the path that was being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, including unknown direction/strategy tags.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Structurally valid YAML carrying an out-of-range or inconsistent value.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// A single rejected value. `repository` is the index into `repositories`
/// when the problem is scoped to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{}", scope_prefix(.repository), .message)]
pub struct ValidationError {
    pub repository: Option<usize>,
    pub message: String,
}

impl ValidationError {
    pub fn global(message: impl Into<String>) -> Self {
        Self {
            repository: None,
            message: message.into(),
        }
    }

    pub fn repository(index: usize, message: impl Into<String>) -> Self {
        Self {
            repository: Some(index),
            message: message.into(),
        }
    }
}

fn scope_prefix(repository: &Option<usize>) -> String {
    match repository {
        Some(index) => format!("repository {index}: "),
        None => String::new(),
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
