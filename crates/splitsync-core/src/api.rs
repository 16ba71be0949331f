//! Collaborator interfaces consumed by the sync engine.
//!
//! [`PullRequestApi`] is the hosting-service transport and [`CommitCopier`]
//! replays commits between repositories. Implement them against a real
//! service, or use [`crate::fakes`] in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;
use crate::model::{CommitStatus, OpenState, PullRequestInfo, StatusState};

/// Authenticated pull request API.
///
/// Lookups return `Ok(None)` when the addressed object does not exist. Every
/// other failure is returned as an error and is never retried here.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    /// Head commit of `branch`, if the branch exists.
    async fn fetch_ref(&self, repo: &str, branch: &str) -> SyncResult<Option<String>>;

    async fn fetch_commit_statuses(&self, repo: &str, sha: &str) -> SyncResult<Vec<CommitStatus>>;

    /// A PR whose head branch is `branch`. Open PRs are preferred; closed
    /// ones are only considered with `include_closed`.
    async fn fetch_pr_by_branch(
        &self,
        repo: &str,
        branch: &str,
        include_closed: bool,
    ) -> SyncResult<Option<PullRequestInfo>>;

    async fn fetch_pr_by_number(&self, repo: &str, number: u64)
        -> SyncResult<Option<PullRequestInfo>>;

    /// Paths of files changed by the PR, relative to the repository root.
    async fn fetch_pr_files(&self, repo: &str, number: u64) -> SyncResult<Vec<String>>;

    async fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> SyncResult<()>;

    /// Force-move an existing branch to `sha`, discarding its commits.
    async fn reset_branch(&self, repo: &str, branch: &str, sha: &str) -> SyncResult<()>;

    async fn create_pull_request(
        &self,
        repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> SyncResult<PullRequestInfo>;

    /// Replace the title and/or body. `None` leaves the field unchanged.
    async fn update_pull_request(
        &self,
        repo: &str,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> SyncResult<()>;

    async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> SyncResult<()>;

    async fn set_commit_status(
        &self,
        repo: &str,
        sha: &str,
        context: &str,
        state: StatusState,
    ) -> SyncResult<()>;

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_title: &str,
        commit_message: &str,
    ) -> SyncResult<()>;

    async fn set_pull_request_state(&self, repo: &str, number: u64, state: OpenState)
        -> SyncResult<()>;
}

/// Commit range to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySource {
    pub repo_name: String,
    /// Exclusive lower bound of the range.
    pub before_sha: String,
    /// Inclusive upper bound of the range.
    pub after_sha: String,
    /// Only changes under this subdirectory are replayed, relative to it.
    pub sub_path: Option<String>,
}

/// Where replayed commits land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyTarget {
    pub repo_name: String,
    pub branch: String,
    /// Expected current head of `branch`.
    pub sha: String,
    /// Replayed paths are placed under this subdirectory.
    pub sub_path: Option<String>,
    /// Replaces the original commit messages when set.
    pub generic_message: Option<String>,
}

/// Replays a commit range from one repository onto a branch of another.
///
/// No conflict resolution is attempted; a replay that does not apply fails.
#[async_trait]
pub trait CommitCopier: Send + Sync {
    async fn copy_commits(&self, source: &CopySource, target: &CopyTarget) -> SyncResult<()>;
}
