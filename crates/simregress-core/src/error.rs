//! Error taxonomy for regression runs.
//!
//! Only [`RegressError::Config`] and [`RegressError::Interrupted`] end a run.
//! Everything else is contained to a single test and turned into an outcome
//! or a warning by the pipeline.

use std::path::PathBuf;

/// Errors produced by the regression driver.
#[derive(Debug, thiserror::Error)]
pub enum RegressError {
    /// Invalid or missing paths, empty test set, bad marker patterns.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write log {path}: {source}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write summary {path}: {source}")]
    SummaryWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("regression run interrupted")]
    Interrupted,

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegressError {
    /// Shorthand for a [`RegressError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        RegressError::Config(msg.into())
    }

    /// Whether this error aborts the whole run before any test executes.
    pub fn is_config(&self) -> bool {
        matches!(self, RegressError::Config(_))
    }
}

/// Result type for regression operations.
pub type Result<T> = std::result::Result<T, RegressError>;
