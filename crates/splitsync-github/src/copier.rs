//! Commit replay through git subprocesses.
//!
//! Each copy works in a scratch directory: the source repository is cloned
//! without a checkout, every commit in `before..after` is exported with
//! `git format-patch` (optionally relative to a subdirectory) and applied to
//! a clone of the target branch with `git am`. The branch is pushed once at
//! the end, only when something was applied.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use splitsync_core::meta::{PRIVATE_FLAG, PUBLIC_MESSAGE_KEY};
use splitsync_core::{
    parse_commit_meta, CommitCopier, CopySource, CopyTarget, SyncError, SyncResult,
};

use crate::config::GitHubConfig;
use crate::error::{GitHubError, Result};

const DEFAULT_COMMITTER_NAME: &str = "splitsync";
const DEFAULT_COMMITTER_EMAIL: &str = "splitsync@users.noreply.github.com";

/// [`CommitCopier`] that shells out to `git`.
pub struct GitCommitCopier {
    config: GitHubConfig,
    committer_name: String,
    committer_email: String,
}

impl GitCommitCopier {
    pub fn new(config: GitHubConfig) -> Self {
        GitCommitCopier {
            config,
            committer_name: DEFAULT_COMMITTER_NAME.to_string(),
            committer_email: DEFAULT_COMMITTER_EMAIL.to_string(),
        }
    }

    /// Committer identity recorded on replayed commits. Authors are kept.
    pub fn with_committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer_name = name.into();
        self.committer_email = email.into();
        self
    }

    async fn git(&self, dir: &Path, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_COMMITTER_NAME", &self.committer_name)
            .env("GIT_COMMITTER_EMAIL", &self.committer_email)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(GitHubError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: self
                    .config
                    .redact(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn replay(&self, source: &CopySource, target: &CopyTarget) -> Result<usize> {
        let scratch = tempfile::tempdir()?;
        let work = scratch.path();

        let source_url = self.config.clone_url(&source.repo_name);
        self.git(
            work,
            &["clone", "--quiet", "--no-checkout", &source_url, "source"],
            None,
        )
        .await?;
        let source_dir = work.join("source");
        self.ensure_commit(&source_dir, &source.after_sha).await?;

        let target_url = self.config.clone_url(&target.repo_name);
        self.git(
            work,
            &[
                "clone",
                "--quiet",
                "--single-branch",
                "--branch",
                &target.branch,
                &target_url,
                "target",
            ],
            None,
        )
        .await?;
        let target_dir = work.join("target");

        let head = self.git(&target_dir, &["rev-parse", "HEAD"], None).await?;
        if head.trim() != target.sha {
            return Err(GitHubError::Git {
                command: "rev-parse".to_string(),
                stderr: format!(
                    "branch {} is at {} instead of {}",
                    target.branch,
                    head.trim(),
                    target.sha
                ),
            });
        }

        let range = format!("{}..{}", source.before_sha, source.after_sha);
        let revs = self
            .git(&source_dir, &["rev-list", "--reverse", "--no-merges", &range], None)
            .await?;

        let relative = source.sub_path.as_deref().map(|p| format!("--relative={}", dir_arg(p)));
        let directory = target.sub_path.as_deref().map(|p| format!("--directory={}", dir_arg(p)));

        let mut applied = 0;
        for sha in revs.lines().map(str::trim).filter(|s| !s.is_empty()) {
            let message = self
                .git(&source_dir, &["log", "-1", "--format=%B", sha], None)
                .await?;
            let meta = parse_commit_meta(&message);
            if meta.flag(PRIVATE_FLAG) {
                debug!(sha = %sha, "Skipping private commit");
                continue;
            }

            let mut args = vec!["format-patch", "-1", "--stdout"];
            if let Some(flag) = &relative {
                args.push(flag.as_str());
            }
            args.push(sha);
            let patch = self.git(&source_dir, &args, None).await?;
            if !patch.contains("\ndiff --git ") {
                debug!(sha = %sha, "Skipping commit with no changes in range");
                continue;
            }

            let mut args = vec!["am", "--quiet", "--keep-cr"];
            if let Some(flag) = &directory {
                args.push(flag.as_str());
            }
            if let Err(err) = self.git(&target_dir, &args, Some(&patch)).await {
                let _ = self.git(&target_dir, &["am", "--abort"], None).await;
                return Err(err);
            }

            if let Some(generic) = &target.generic_message {
                let replacement = meta.text(PUBLIC_MESSAGE_KEY).unwrap_or(generic.as_str());
                self.git(
                    &target_dir,
                    &["commit", "--amend", "--quiet", "--message", replacement],
                    None,
                )
                .await?;
            }
            applied += 1;
        }

        if applied > 0 {
            let refspec = format!("HEAD:refs/heads/{}", target.branch);
            self.git(&target_dir, &["push", "--quiet", "origin", &refspec], None)
                .await?;
        }
        Ok(applied)
    }

    /// Fetch `sha` when the clone does not already contain it (e.g. a fork head).
    async fn ensure_commit(&self, repo_dir: &Path, sha: &str) -> Result<()> {
        let object = format!("{sha}^{{commit}}");
        if self
            .git(repo_dir, &["cat-file", "-e", &object], None)
            .await
            .is_ok()
        {
            return Ok(());
        }
        self.git(repo_dir, &["fetch", "--quiet", "origin", sha], None)
            .await?;
        Ok(())
    }
}

fn dir_arg(path: &str) -> String {
    format!("{}/", path.trim_matches('/'))
}

#[async_trait]
impl CommitCopier for GitCommitCopier {
    async fn copy_commits(&self, source: &CopySource, target: &CopyTarget) -> SyncResult<()> {
        let applied = self
            .replay(source, target)
            .await
            .map_err(|err| SyncError::CommitCopy {
                source_repo: source.repo_name.clone(),
                target_repo: target.repo_name.clone(),
                reason: err.to_string(),
            })?;
        info!(
            source = %source.repo_name,
            target = %target.repo_name,
            branch = %target.branch,
            applied,
            "Replayed commits"
        );
        Ok(())
    }
}
