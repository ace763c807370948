//! Error types shared by the repograde crates.
//!
//! Per-suite and per-validator failures are values, not errors. What lands here is the
//! short list of conditions that abort a whole evaluation or analysis pass.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RepogradeError {
    #[error("repository root does not exist: {}", .0.display())]
    RepoRootMissing(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RepogradeError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for conditions caused by the caller's inputs rather than the environment.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::UnsupportedFormat(_) | Self::Toml(_) | Self::Json(_)
        )
    }
}

pub type Result<T, E = RepogradeError> = std::result::Result<T, E>;
