//! GitHub REST client implementing [`PullRequestApi`].
//!
//! Lookups map 404 to `None`; every other non-success status becomes
//! [`GitHubError::Status`], surfaced to the engine as `SyncError::Api`.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use splitsync_core::model::split_repo_name;
use splitsync_core::{
    CommitStatus, OpenState, PrState, PullRequestApi, PullRequestInfo, StatusState, SyncResult,
};

use crate::config::GitHubConfig;
use crate::error::{GitHubError, Result};

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiRepo {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiBranch {
    #[serde(rename = "ref")]
    branch: String,
    sha: String,
    repo: Option<ApiRepo>,
}

#[derive(Debug, Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    user: ApiUser,
    html_url: String,
    state: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merged_at: Option<String>,
    merge_commit_sha: Option<String>,
    base: ApiBranch,
    head: ApiBranch,
}

impl ApiPullRequest {
    fn into_info(self, repo_name: &str) -> PullRequestInfo {
        let state = if self.merged == Some(true) || self.merged_at.is_some() {
            PrState::Merged
        } else if self.state == "open" {
            PrState::Open
        } else {
            PrState::Closed
        };
        let merge_commit_sha = match state {
            PrState::Merged => self.merge_commit_sha,
            _ => None,
        };
        PullRequestInfo {
            repo_name: repo_name.to_string(),
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            author: self.user.login,
            url: self.html_url,
            state,
            base_branch: self.base.branch,
            base_sha: self.base.sha,
            base_repo: self
                .base
                .repo
                .map(|r| r.full_name)
                .unwrap_or_else(|| repo_name.to_string()),
            head_branch: self.head.branch,
            head_sha: self.head.sha,
            head_repo: self.head.repo.map(|r| r.full_name).unwrap_or_default(),
            merge_commit_sha,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiRefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    object: ApiRefObject,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    context: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct ApiCombinedStatus {
    #[serde(default)]
    statuses: Vec<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdatePullRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated GitHub REST client.
pub struct GitHubClient {
    config: GitHubConfig,
    http: reqwest::Client,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;
        Ok(GitHubClient { config, http })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.config.api_url, path);
        self.http
            .request(method, url)
            .bearer_auth(&self.config.token)
    }

    async fn check(endpoint: String, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(text);
        Err(GitHubError::Status {
            endpoint,
            status: status.as_u16(),
            message,
        })
    }

    /// GET returning `None` on 404.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        debug!(path = %path, "GET");
        let response = self.request(Method::GET, path).query(query).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(format!("GET {path}"), response).await?;
        Ok(Some(response.json().await?))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response> {
        debug!(method = %method, path = %path, "write");
        let endpoint = format!("{method} {path}");
        let response = self.request(method, path).json(body).send().await?;
        Self::check(endpoint, response).await
    }

    async fn pulls_by_head(
        &self,
        repo: &str,
        branch: &str,
        state: &str,
    ) -> SyncResult<Vec<ApiPullRequest>> {
        let (owner, _) = split_repo_name(repo)?;
        let query = [
            ("head", format!("{owner}:{branch}")),
            ("state", state.to_string()),
            ("per_page", PAGE_SIZE.to_string()),
        ];
        Ok(self
            .get_optional(&format!("repos/{repo}/pulls"), &query)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn fetch_ref(&self, repo: &str, branch: &str) -> SyncResult<Option<String>> {
        let found: Option<ApiRef> = self
            .get_optional(&format!("repos/{repo}/git/ref/heads/{branch}"), &[])
            .await?;
        Ok(found.map(|r| r.object.sha))
    }

    async fn fetch_commit_statuses(&self, repo: &str, sha: &str) -> SyncResult<Vec<CommitStatus>> {
        let combined: Option<ApiCombinedStatus> = self
            .get_optional(
                &format!("repos/{repo}/commits/{sha}/status"),
                &[("per_page", PAGE_SIZE.to_string())],
            )
            .await?;
        let statuses = combined.map(|c| c.statuses).unwrap_or_default();
        statuses
            .into_iter()
            .map(|s| {
                s.state
                    .parse::<StatusState>()
                    .map(|state| CommitStatus::new(s.context, state))
            })
            .collect()
    }

    async fn fetch_pr_by_branch(
        &self,
        repo: &str,
        branch: &str,
        include_closed: bool,
    ) -> SyncResult<Option<PullRequestInfo>> {
        let state = if include_closed { "all" } else { "open" };
        let pulls = self.pulls_by_head(repo, branch, state).await?;
        let mut fallback = None;
        for info in pulls.into_iter().map(|p| p.into_info(repo)) {
            if info.is_open() {
                return Ok(Some(info));
            }
            fallback.get_or_insert(info);
        }
        Ok(fallback)
    }

    async fn fetch_pr_by_number(
        &self,
        repo: &str,
        number: u64,
    ) -> SyncResult<Option<PullRequestInfo>> {
        let found: Option<ApiPullRequest> = self
            .get_optional(&format!("repos/{repo}/pulls/{number}"), &[])
            .await?;
        Ok(found.map(|p| p.into_info(repo)))
    }

    async fn fetch_pr_files(&self, repo: &str, number: u64) -> SyncResult<Vec<String>> {
        let mut files = Vec::new();
        let mut page = 1usize;
        loop {
            let batch: Vec<ApiFile> = self
                .get_optional(
                    &format!("repos/{repo}/pulls/{number}/files"),
                    &[
                        ("per_page", PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?
                .unwrap_or_default();
            let done = batch.len() < PAGE_SIZE;
            files.extend(batch.into_iter().map(|f| f.filename));
            if done {
                return Ok(files);
            }
            page += 1;
        }
    }

    async fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> SyncResult<()> {
        self.send(
            Method::POST,
            &format!("repos/{repo}/git/refs"),
            &json!({ "ref": format!("refs/heads/{branch}"), "sha": sha }),
        )
        .await?;
        Ok(())
    }

    async fn reset_branch(&self, repo: &str, branch: &str, sha: &str) -> SyncResult<()> {
        self.send(
            Method::PATCH,
            &format!("repos/{repo}/git/refs/heads/{branch}"),
            &json!({ "sha": sha, "force": true }),
        )
        .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> SyncResult<PullRequestInfo> {
        let response = self
            .send(
                Method::POST,
                &format!("repos/{repo}/pulls"),
                &json!({ "title": title, "head": head, "base": base, "body": body }),
            )
            .await?;
        let created: ApiPullRequest = response.json().await.map_err(GitHubError::from)?;
        Ok(created.into_info(repo))
    }

    async fn update_pull_request(
        &self,
        repo: &str,
        number: u64,
        title: Option<&str>,
        body: Option<&str>,
    ) -> SyncResult<()> {
        if title.is_none() && body.is_none() {
            return Ok(());
        }
        self.send(
            Method::PATCH,
            &format!("repos/{repo}/pulls/{number}"),
            &UpdatePullRequest { title, body },
        )
        .await?;
        Ok(())
    }

    async fn create_issue_comment(&self, repo: &str, number: u64, body: &str) -> SyncResult<()> {
        self.send(
            Method::POST,
            &format!("repos/{repo}/issues/{number}/comments"),
            &json!({ "body": body }),
        )
        .await?;
        Ok(())
    }

    async fn set_commit_status(
        &self,
        repo: &str,
        sha: &str,
        context: &str,
        state: StatusState,
    ) -> SyncResult<()> {
        // The API accepts error/failure/pending/success only.
        let state = match state {
            StatusState::Expected => StatusState::Pending,
            other => other,
        };
        self.send(
            Method::POST,
            &format!("repos/{repo}/statuses/{sha}"),
            &json!({ "state": state.as_str(), "context": context }),
        )
        .await?;
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        commit_title: &str,
        commit_message: &str,
    ) -> SyncResult<()> {
        self.send(
            Method::PUT,
            &format!("repos/{repo}/pulls/{number}/merge"),
            &json!({ "commit_title": commit_title, "commit_message": commit_message }),
        )
        .await?;
        Ok(())
    }

    async fn set_pull_request_state(
        &self,
        repo: &str,
        number: u64,
        state: OpenState,
    ) -> SyncResult<()> {
        self.send(
            Method::PATCH,
            &format!("repos/{repo}/pulls/{number}"),
            &json!({ "state": state.as_str() }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitsync_core::SyncError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn pull_json(number: u64, state: &str, merged_at: Option<&str>) -> serde_json::Value {
        json!({
            "number": number,
            "title": "Fix cache",
            "body": null,
            "user": { "login": "octocat" },
            "html_url": format!("https://github.com/org/parent/pull/{number}"),
            "state": state,
            "merged_at": merged_at,
            "merge_commit_sha": "m1",
            "base": { "ref": "main", "sha": "b1", "repo": { "full_name": "org/parent" } },
            "head": { "ref": "fix", "sha": "h1", "repo": null }
        })
    }

    /// Answer one HTTP request with `status` and `body`; resolves to the raw request.
    async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (url, handle)
    }

    /// Headers received and, when announced, the whole body too.
    fn request_complete(raw: &[u8]) -> bool {
        let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= end + 4 + length
    }

    fn client(url: &str) -> GitHubClient {
        GitHubClient::new(GitHubConfig::new(url, "{repo}", "test-token")).unwrap()
    }

    #[test]
    fn test_pull_request_mapping() {
        let pr: ApiPullRequest = serde_json::from_value(pull_json(7, "closed", None)).unwrap();
        let info = pr.into_info("org/parent");
        assert_eq!(info.state, PrState::Closed);
        assert_eq!(info.body, "");
        assert_eq!(info.head_repo, "");
        assert_eq!(info.base_repo, "org/parent");
        assert_eq!(info.merge_commit_sha, None);

        let pr: ApiPullRequest =
            serde_json::from_value(pull_json(7, "closed", Some("2024-01-01T00:00:00Z"))).unwrap();
        let info = pr.into_info("org/parent");
        assert!(info.is_merged());
        assert_eq!(info.merge_commit_sha.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_fetch_pr_sends_auth_and_maps_body() {
        let (url, server) = serve_once("200 OK", pull_json(42, "open", None).to_string()).await;
        let pr = client(&url)
            .fetch_pr_by_number("org/parent", 42)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.number, 42);
        assert!(pr.is_open());

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /repos/org/parent/pulls/42 "));
        assert!(request.contains("authorization: bearer test-token"));
        assert!(request.contains("accept: application/vnd.github+json"));
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let (url, server) = serve_once("404 Not Found", r#"{"message":"Not Found"}"#.into()).await;
        let found = client(&url).fetch_ref("org/api", "missing").await.unwrap();
        assert!(found.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let (url, server) = serve_once(
            "422 Unprocessable Entity",
            r#"{"message":"Reference already exists"}"#.into(),
        )
        .await;
        let err = client(&url)
            .create_branch("org/api", "org/parent/1", "abc")
            .await
            .unwrap_err();
        match err {
            SyncError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Reference already exists");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /repos/org/api/git/refs "));
    }

    #[tokio::test]
    async fn test_reset_branch_forces_ref_update() {
        let (url, server) = serve_once("200 OK", r#"{"ref":"refs/heads/org/parent/1"}"#.into()).await;
        client(&url)
            .reset_branch("org/api", "org/parent/1", "abc")
            .await
            .unwrap();
        let request = server.await.unwrap();
        assert!(request.starts_with("PATCH /repos/org/api/git/refs/heads/org/parent/1 "));
        assert!(request.contains(r#""force":true"#));
        assert!(request.contains(r#""sha":"abc""#));
    }

    #[tokio::test]
    async fn test_statuses_parse_states() {
        let body = json!({
            "state": "failure",
            "statuses": [
                { "context": "ci/unit", "state": "success" },
                { "context": "ci/lint", "state": "failure" }
            ]
        });
        let (url, server) = serve_once("200 OK", body.to_string()).await;
        let statuses = client(&url)
            .fetch_commit_statuses("org/parent", "abc")
            .await
            .unwrap();
        assert_eq!(
            statuses,
            vec![
                CommitStatus::new("ci/unit", StatusState::Success),
                CommitStatus::new("ci/lint", StatusState::Failure),
            ]
        );
        server.await.unwrap();
    }
}
