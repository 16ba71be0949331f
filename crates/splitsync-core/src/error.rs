//! Error types for the synchronization engine.
//!
//! Only transport failures and broken configuration are errors. Unmet
//! preconditions (missing base branch, no relationship configured, no
//! candidate repository) are reported as ordinary outcomes by the callers.

use thiserror::Error;

/// Errors produced by the sync engine and its collaborators.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The API answered with a non-success status.
    #[error("api request {endpoint} failed with status {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The API could not be reached or the response could not be read.
    #[error("transport error: {0}")]
    Transport(String),

    /// Commit replay between two repositories failed.
    #[error("commit copy from {source_repo} to {target_repo} failed: {reason}")]
    CommitCopy {
        source_repo: String,
        target_repo: String,
        reason: String,
    },

    /// The relationship directory or sync settings are invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A repository name is not in `owner/repo` form.
    #[error("invalid repository name: {0}")]
    InvalidRepoName(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True when the API reported that the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Api { status: 404, .. })
    }
}

/// Convenience result alias.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
