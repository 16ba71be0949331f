//! GitHub collaborators for splitsync.
//!
//! [`GitHubClient`] implements the pull request API over the REST API and
//! [`GitCommitCopier`] replays commits between repositories with `git`.

pub mod client;
pub mod config;
pub mod copier;
pub mod error;

pub use client::GitHubClient;
pub use config::GitHubConfig;
pub use copier::GitCommitCopier;
pub use error::{GitHubError, Result};
