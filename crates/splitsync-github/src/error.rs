//! Error types for splitsync-github

use splitsync_core::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitHubError {
    /// Non-success HTTP status from the API
    #[error("GitHub API {endpoint} returned {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(String),

    /// A git subprocess failed
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// The configured token variable is not set
    #[error("environment variable {0} holding the GitHub token is not set")]
    MissingToken(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Http(err.to_string())
    }
}

impl From<GitHubError> for SyncError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Status {
                endpoint,
                status,
                message,
            } => SyncError::Api {
                endpoint,
                status,
                message,
            },
            GitHubError::Http(msg) => SyncError::Transport(msg),
            GitHubError::MissingToken(var) => {
                SyncError::Config(format!("environment variable {var} is not set"))
            }
            GitHubError::Io(e) => SyncError::Io(e),
            GitHubError::Json(e) => SyncError::Serialization(e),
            other @ GitHubError::Git { .. } => SyncError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;
