// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Cooperative cancellation observed at a suspension point.
    ///
    /// Discovery and index implementations return this instead of a partial
    /// result; the build run decides whether it was an external interruption.
    #[error("build cancelled")]
    Cancelled,

    /// The execution context for a pass could not be acquired at all.
    #[error("execution context unavailable for project '{project}': {reason}")]
    ContextUnavailable { project: String, reason: String },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Cycle detected in project dependencies: {0}")]
    DependencyCycle(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoordinatorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoordinatorError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CoordinatorError>;
