//! Error types for replay aggregation

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for replay-pool operations
#[derive(Error, Debug)]
pub enum ReplayError {
    /// A checkpoint's file set is incomplete or unreadable
    #[error("checkpoint {suffix} not found under {}", dir.display())]
    NotFound {
        /// Storage location that was probed
        dir: PathBuf,
        /// Checkpoint suffix that failed to load
        suffix: u64,
    },

    /// Unrecognized quality or sampling mode
    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),

    /// No shards are loaded
    #[error("replay pool holds no shards")]
    EmptyPool,

    /// Invalid caller-supplied argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ReplayError {
    /// Whether this error marks a missing or incomplete checkpoint
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for replay-pool operations
pub type Result<T> = std::result::Result<T, ReplayError>;
