//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `MemoryGitHub` and `RecordingCopier`, which satisfy the trait
//! contracts without any network or git access and record every call.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::api::{CommitCopier, CopySource, CopyTarget, PullRequestApi};
use crate::error::{SyncError, SyncResult};
use crate::model::{CommitStatus, OpenState, PrState, PullRequestInfo, StatusState};

// ---------------------------------------------------------------------------
// MemoryGitHub
// ---------------------------------------------------------------------------

/// A recorded API call: operation name plus its main arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub op: &'static str,
    pub args: Vec<String>,
}

impl ApiCall {
    pub fn is_write(&self) -> bool {
        WRITE_OPS.contains(&self.op)
    }
}

const WRITE_OPS: &[&str] = &[
    "create_branch",
    "reset_branch",
    "create_pull_request",
    "update_pull_request",
    "create_issue_comment",
    "set_commit_status",
    "merge_pull_request",
    "set_pull_request_state",
];

#[derive(Debug, Default)]
struct HostState {
    prs: Vec<PullRequestInfo>,
    files: HashMap<(String, u64), Vec<String>>,
    refs: HashMap<(String, String), String>,
    statuses: HashMap<(String, String), Vec<CommitStatus>>,
    comments: Vec<(String, u64, String)>,
    calls: Vec<ApiCall>,
    failing_ops: HashSet<&'static str>,
}

/// In-memory hosting service backed by plain collections.
#[derive(Debug, Default)]
pub struct MemoryGitHub {
    state: Mutex<HostState>,
}

/// A minimal open PR; adjust fields on the returned value as needed.
pub fn pr_fixture(repo: &str, number: u64, head_branch: &str, base_branch: &str) -> PullRequestInfo {
    PullRequestInfo {
        repo_name: repo.to_string(),
        number,
        title: format!("PR {number}"),
        body: String::new(),
        author: "octocat".to_string(),
        url: format!("https://github.com/{repo}/pull/{number}"),
        state: PrState::Open,
        base_branch: base_branch.to_string(),
        base_sha: format!("{repo}-{base_branch}-base"),
        base_repo: repo.to_string(),
        head_branch: head_branch.to_string(),
        head_sha: format!("{repo}-{number}-head"),
        head_repo: repo.to_string(),
        merge_commit_sha: None,
    }
}

fn api_error(op: &str, status: u16, message: &str) -> SyncError {
    SyncError::Api {
        endpoint: op.to_string(),
        status,
        message: message.to_string(),
    }
}

impl MemoryGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn add_pr(&self, pr: PullRequestInfo) {
        let mut state = self.state.lock().unwrap();
        state.prs.retain(|p| !(p.repo_name == pr.repo_name && p.number == pr.number));
        state.prs.push(pr);
    }

    pub fn set_ref(&self, repo: &str, branch: &str, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .refs
            .insert((repo.to_string(), branch.to_string()), sha.to_string());
    }

    pub fn set_files(&self, repo: &str, number: u64, files: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            (repo.to_string(), number),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }

    pub fn set_statuses(&self, repo: &str, sha: &str, statuses: Vec<CommitStatus>) {
        let mut state = self.state.lock().unwrap();
        state
            .statuses
            .insert((repo.to_string(), sha.to_string()), statuses);
    }

    /// Make every later call to `op` fail with a 500.
    pub fn fail_on(&self, op: &'static str) {
        self.state.lock().unwrap().failing_ops.insert(op);
    }

    pub fn pr(&self, repo: &str, number: u64) -> Option<PullRequestInfo> {
        let state = self.state.lock().unwrap();
        state
            .prs
            .iter()
            .find(|p| p.repo_name == repo && p.number == number)
            .cloned()
    }

    pub fn prs_in(&self, repo: &str) -> Vec<PullRequestInfo> {
        let state = self.state.lock().unwrap();
        state
            .prs
            .iter()
            .filter(|p| p.repo_name == repo)
            .cloned()
            .collect()
    }

    pub fn ref_sha(&self, repo: &str, branch: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .refs
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
    }

    pub fn statuses(&self, repo: &str, sha: &str) -> Vec<CommitStatus> {
        let state = self.state.lock().unwrap();
        state
            .statuses
            .get(&(repo.to_string(), sha.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn comments(&self) -> Vec<(String, u64, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<ApiCall> {
        self.calls().into_iter().filter(ApiCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, op: &'static str, args: &[&str]) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ApiCall {
            op,
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        if state.failing_ops.contains(op) {
            return Err(api_error(op, 500, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl PullRequestApi for MemoryGitHub {
    async fn fetch_ref(&self, repo: &str, branch: &str) -> SyncResult<Option<String>> {
        self.record("fetch_ref", &[repo, branch])?;
        Ok(self.ref_sha(repo, branch))
    }

    async fn fetch_commit_statuses(&self, repo: &str, sha: &str) -> SyncResult<Vec<CommitStatus>> {
        self.record("fetch_commit_statuses", &[repo, sha])?;
        Ok(self.statuses(repo, sha))
    }

    async fn fetch_pr_by_branch(
        &self,
        repo: &str,
        branch: &str,
        include_closed: bool,
    ) -> SyncResult<Option<PullRequestInfo>> {
        self.record("fetch_pr_by_branch", &[repo, branch])?;
        let state = self.state.lock().unwrap();
        let mut matching = state
            .prs
            .iter()
            .filter(|p| p.repo_name == repo && p.head_branch == branch);
        let open = matching.clone().find(|p| p.is_open());
        Ok(match open {
            Some(pr) => Some(pr.clone()),
            None if include_closed => matching.next().cloned(),
            None => None,
        })
    }

    async fn fetch_pr_by_number(
        &self,
        repo: &str,
        number: u64,
    ) -> SyncResult<Option<PullRequestInfo>> {
        self.record("fetch_pr_by_number", &[repo, &number.to_string()])?;
        Ok(self.pr(repo, number))
    }

    async fn fetch_pr_files(&self, repo: &str, number: u64) -> SyncResult<Vec<String>> {
        self.record("fetch_pr_files", &[repo, &number.to_string()])?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .get(&(repo.to_string(), number))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> SyncResult<()> {
        self.record("create_branch", &[repo, branch, sha])?;
        let mut state = self.state.lock().unwrap();
        let key = (repo.to_string(), branch.to_string());
        if state.refs.contains_key(&key) {
            return Err(api_error("create_branch", 422, "Reference already exists"));
        }
        state.refs.insert(key, sha.to_string());
        Ok(())
    }

    async fn reset_branch(&self, repo: &str, branch: &str, sha: &str) -> SyncResult<()> {
        self.record("reset_branch", &[repo, branch, sha])?;
        let mut state = self.state.lock().unwrap();
        match state.refs.get_mut(&(repo.to_string(), branch.to_string())) {
            Some(head) => {
                *head = sha.to_string();
                Ok(())
            }
            None => Err(api_error("reset_branch", 422, "Reference does not exist")),
        }
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> SyncResult<PullRequestInfo> {
        self.record("create_pull_request", &[repo, head, base, title])?;
        let mut state = self.state.lock().unwrap();
        let head_sha = state
            .refs
            .get(&(repo.to_string(), head.to_string()))
            .cloned()
            .ok_or_else(|| api_error("create_pull_request", 422, "head branch does not exist"))?;
        let base_sha = state
            .refs
            .get(&(repo.to_string(), base.to_string()))
            .cloned()
            .ok_or_else(|| api_error("create_pull_request", 422, "base branch does not exist"))?;
        let number = state
            .prs
            .iter()
            .filter(|p| p.repo_name == repo)
            .map(|p| p.number)
            .max()
            .unwrap_or(0)
            + 1;
        let mut pr = pr_fixture(repo, number, head, base);
        pr.title = title.to_string();
        pr.body = body.to_string();
        pr.author = "splitsync-bot".to_string();
        pr.head_sha = head_sha;
        pr.base_sha = base_sha;
        state.prs.push(pr.clone());
        Ok(pr)
    }

    async fn update_pull_request(
        &self,
        repo: &str,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> SyncResult<()> {
        self.record(
            "update_pull_request",
            &[repo, &number.to_string(), title.unwrap_or(""), body.unwrap_or("")],
        )?;
        let mut state = self.state.lock().unwrap();
        let pr = state
            .prs
            .iter_mut()
            .find(|p| p.repo_name == repo && p.number == number)
            .ok_or_else(|| api_error("update_pull_request", 404, "Not Found"))?;
        if let Some(title) = title {
            pr.title = title.to_string();
        }
        if let Some(body) = body {
            pr.body = body.to_string();
        }
        Ok(())
    }

    async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> SyncResult<()> {
        self.record("create_issue_comment", &[repo, &number.to_string(), body])?;
        let mut state = self.state.lock().unwrap();
        state.comments.push((repo.to_string(), number, body.to_string()));
        Ok(())
    }

    async fn set_commit_status(
        &self,
        repo: &str,
        sha: &str,
        context: &str,
        status: StatusState,
    ) -> SyncResult<()> {
        self.record("set_commit_status", &[repo, sha, context, status.as_str()])?;
        let mut state = self.state.lock().unwrap();
        let entries = state
            .statuses
            .entry((repo.to_string(), sha.to_string()))
            .or_default();
        entries.retain(|s| s.context != context);
        entries.push(CommitStatus::new(context, status));
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_title: &str,
        commit_message: &str,
    ) -> SyncResult<()> {
        self.record(
            "merge_pull_request",
            &[repo, &number.to_string(), commit_title, commit_message],
        )?;
        let mut state = self.state.lock().unwrap();
        let pr = state
            .prs
            .iter_mut()
            .find(|p| p.repo_name == repo && p.number == number)
            .ok_or_else(|| api_error("merge_pull_request", 404, "Not Found"))?;
        if !pr.is_open() {
            return Err(api_error("merge_pull_request", 405, "Pull Request is not mergeable"));
        }
        pr.state = PrState::Merged;
        pr.merge_commit_sha = Some(format!("{}-merged", pr.head_sha));
        Ok(())
    }

    async fn set_pull_request_state(
        &self,
        repo: &str,
        number: u64,
        target: OpenState,
    ) -> SyncResult<()> {
        self.record(
            "set_pull_request_state",
            &[repo, &number.to_string(), target.as_str()],
        )?;
        let mut state = self.state.lock().unwrap();
        let pr = state
            .prs
            .iter_mut()
            .find(|p| p.repo_name == repo && p.number == number)
            .ok_or_else(|| api_error("set_pull_request_state", 404, "Not Found"))?;
        if pr.is_merged() {
            return Err(api_error("set_pull_request_state", 422, "pull request is merged"));
        }
        pr.state = match target {
            OpenState::Open => PrState::Open,
            OpenState::Closed => PrState::Closed,
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingCopier
// ---------------------------------------------------------------------------

/// Commit copier that records requests instead of touching git.
///
/// When built with [`RecordingCopier::advancing`], a successful copy moves the
/// target branch in the given [`MemoryGitHub`] to `"<after_sha>-replayed"`.
#[derive(Debug, Default)]
pub struct RecordingCopier {
    copies: Mutex<Vec<(CopySource, CopyTarget)>>,
    host: Option<Arc<MemoryGitHub>>,
    fail: bool,
}

impl RecordingCopier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advancing(host: Arc<MemoryGitHub>) -> Self {
        Self {
            host: Some(host),
            ..Self::default()
        }
    }

    /// A copier whose every replay fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn copies(&self) -> Vec<(CopySource, CopyTarget)> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommitCopier for RecordingCopier {
    async fn copy_commits(&self, source: &CopySource, target: &CopyTarget) -> SyncResult<()> {
        self.copies
            .lock()
            .unwrap()
            .push((source.clone(), target.clone()));
        if self.fail {
            return Err(SyncError::CommitCopy {
                source_repo: source.repo_name.clone(),
                target_repo: target.repo_name.clone(),
                reason: "injected failure".to_string(),
            });
        }
        if let Some(host) = &self.host {
            host.set_ref(
                &target.repo_name,
                &target.branch,
                &format!("{}-replayed", source.after_sha),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_pr_by_branch_prefers_open() {
        let host = MemoryGitHub::new();
        let mut closed = pr_fixture("org/a", 1, "feature", "main");
        closed.state = PrState::Closed;
        host.add_pr(closed);
        host.add_pr(pr_fixture("org/a", 2, "feature", "main"));

        let found = host.fetch_pr_by_branch("org/a", "feature", false).await.unwrap();
        assert_eq!(found.map(|p| p.number), Some(2));
    }

    #[tokio::test]
    async fn test_fetch_pr_by_branch_closed_needs_flag() {
        let host = MemoryGitHub::new();
        let mut closed = pr_fixture("org/a", 1, "feature", "main");
        closed.state = PrState::Closed;
        host.add_pr(closed);

        assert!(host.fetch_pr_by_branch("org/a", "feature", false).await.unwrap().is_none());
        assert!(host.fetch_pr_by_branch("org/a", "feature", true).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_branch_rejects_existing() {
        let host = MemoryGitHub::new();
        host.create_branch("org/a", "x", "sha1").await.unwrap();
        let err = host.create_branch("org/a", "x", "sha2").await.unwrap_err();
        assert!(matches!(err, SyncError::Api { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_reset_branch_needs_existing_ref() {
        let host = MemoryGitHub::new();
        let err = host.reset_branch("org/a", "x", "sha1").await.unwrap_err();
        assert!(matches!(err, SyncError::Api { status: 422, .. }));
        host.set_ref("org/a", "x", "sha1");
        host.reset_branch("org/a", "x", "sha2").await.unwrap();
        assert_eq!(host.ref_sha("org/a", "x").as_deref(), Some("sha2"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let host = MemoryGitHub::new();
        host.fail_on("fetch_ref");
        assert!(host.fetch_ref("org/a", "main").await.is_err());
        assert_eq!(host.calls().len(), 1);
        assert!(host.writes().is_empty());
    }

    #[tokio::test]
    async fn test_set_commit_status_replaces_context() {
        let host = MemoryGitHub::new();
        host.set_commit_status("org/a", "s", "ci", StatusState::Pending)
            .await
            .unwrap();
        host.set_commit_status("org/a", "s", "ci", StatusState::Success)
            .await
            .unwrap();
        assert_eq!(
            host.statuses("org/a", "s"),
            vec![CommitStatus::new("ci", StatusState::Success)]
        );
    }
}
