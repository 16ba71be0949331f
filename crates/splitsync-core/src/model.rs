//! Pull request identities and the enriched views fetched per sync.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Split an `owner/repo` name into its two halves.
pub fn split_repo_name(name: &str) -> SyncResult<(&str, &str)> {
    match name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(SyncError::InvalidRepoName(name.to_string())),
    }
}

/// Minimal pull request identity: `owner/repo` plus number.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// Full repository name, e.g. `"acme/widgets"`.
    pub repo_name: String,
    pub number: u64,
}

impl PullRequestRef {
    pub fn new(repo_name: impl Into<String>, number: u64) -> Self {
        Self {
            repo_name: repo_name.into(),
            number,
        }
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo_name, self.number)
    }
}

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

/// Target state for opening or closing a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenState {
    Open,
    Closed,
}

impl OpenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpenState::Open => "open",
            OpenState::Closed => "closed",
        }
    }
}

/// Enriched pull request view. Always re-fetched; never cached across syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub repo_name: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub author: String,
    pub url: String,
    pub state: PrState,
    pub base_branch: String,
    pub base_sha: String,
    /// Full name of the repository the base branch lives in.
    pub base_repo: String,
    pub head_branch: String,
    pub head_sha: String,
    /// Full name of the repository the head branch lives in (differs for forks).
    pub head_repo: String,
    pub merge_commit_sha: Option<String>,
}

impl PullRequestInfo {
    pub fn reference(&self) -> PullRequestRef {
        PullRequestRef::new(self.repo_name.clone(), self.number)
    }

    pub fn is_open(&self) -> bool {
        self.state == PrState::Open
    }

    pub fn is_merged(&self) -> bool {
        self.state == PrState::Merged
    }
}

/// State of a single commit status context.
///
/// The REST API reports lowercase names and GraphQL uppercase ones, so
/// parsing is case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Error,
    Failure,
    Expected,
    Pending,
    Success,
}

impl StatusState {
    /// Lowercase wire name, as written back through the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusState::Error => "error",
            StatusState::Failure => "failure",
            StatusState::Expected => "expected",
            StatusState::Pending => "pending",
            StatusState::Success => "success",
        }
    }
}

impl FromStr for StatusState {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(StatusState::Error),
            "failure" => Ok(StatusState::Failure),
            "expected" => Ok(StatusState::Expected),
            "pending" => Ok(StatusState::Pending),
            "success" => Ok(StatusState::Success),
            other => Err(SyncError::Transport(format!("unknown status state '{other}'"))),
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status context reported on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub context: String,
    pub state: StatusState,
}

impl CommitStatus {
    pub fn new(context: impl Into<String>, state: StatusState) -> Self {
        Self {
            context: context.into(),
            state,
        }
    }
}

/// A resolved primary/secondary pair. Roles are fixed for one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPair {
    /// Source of truth.
    pub primary: PullRequestRef,
    /// Mirror, living on an encoded branch.
    pub secondary: PullRequestRef,
}

impl SyncPair {
    pub fn new(primary: PullRequestRef, secondary: PullRequestRef) -> Self {
        Self { primary, secondary }
    }
}
