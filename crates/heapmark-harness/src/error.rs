//! Harness error types.

use std::path::PathBuf;

use heapmark_core::{ConfigError, RunError, Strategy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid suite configuration: {0}")]
    InvalidSuite(String),

    #[error("scenario catalogue: {0}")]
    Catalogue(#[from] ConfigError),

    #[error("{scenario} with {strategy} (repeat {repeat}) failed: {source}")]
    Run {
        scenario: String,
        strategy: Strategy,
        repeat: usize,
        #[source]
        source: RunError,
    },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
