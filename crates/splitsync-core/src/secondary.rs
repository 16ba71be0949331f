//! Secondary PR pipeline.
//!
//! Creates the mirror of a primary PR in a related repository as one ordered,
//! fail-fast sequence: resolve direction, fetch the primary, resolve the base
//! commit, create the branch, replay commits, open the PR, cross-link.
//!
//! An unmet precondition stops the pipeline with [`PipelineOutcome::Aborted`].
//! Transport and replay errors propagate. Nothing is rolled back; a branch left
//! behind without a PR is moved back to the base and replayed by the next run.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{CommitCopier, CopySource, CopyTarget, PullRequestApi};
use crate::branch_name;
use crate::error::SyncResult;
use crate::meta::{self, PRIMARY_SHA_KEY, PUBLIC_BODY_KEY, PUBLIC_TITLE_KEY};
use crate::metrics::METRICS;
use crate::model::{PullRequestInfo, PullRequestRef};
use crate::obs;
use crate::relationships::{Relationship, RelationshipDirectory};

/// `publicTitle` value meaning "reuse the primary's title verbatim".
pub const SAME_TITLE_SENTINEL: &str = "same";

/// Default signature appended to generated PR bodies.
pub const DEFAULT_BOT_SIGNATURE: &str = "_Synchronized by splitsync._";

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    ResolveDirection,
    FetchPrimary,
    ResolveBase,
    CreateBranch,
    ReplayCommits,
    CreatePullRequest,
    CrossLink,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::ResolveDirection => "resolve_direction",
            PipelineStep::FetchPrimary => "fetch_primary",
            PipelineStep::ResolveBase => "resolve_base",
            PipelineStep::CreateBranch => "create_branch",
            PipelineStep::ReplayCommits => "replay_commits",
            PipelineStep::CreatePullRequest => "create_pull_request",
            PipelineStep::CrossLink => "cross_link",
        };
        f.write_str(name)
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Created {
        pull_request: PullRequestInfo,
        /// A branch left by an earlier run was reused.
        branch_reused: bool,
    },
    Aborted {
        step: PipelineStep,
        reason: String,
    },
}

impl PipelineOutcome {
    pub fn created(&self) -> Option<&PullRequestInfo> {
        match self {
            PipelineOutcome::Created { pull_request, .. } => Some(pull_request),
            PipelineOutcome::Aborted { .. } => None,
        }
    }
}

/// Result of one pipeline step: keep going with a value, or stop quietly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    Continue(T),
    Stop(String),
}

/// Direction of a sync, seen from the primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The secondary is a child of the primary, mapped to `path` in it.
    ToChild { path: String },
    /// The secondary is the parent; the primary maps to `path` in it.
    ToParent { path: String },
}

impl Direction {
    pub fn resolve(
        directory: &RelationshipDirectory,
        primary_repo: &str,
        secondary_repo: &str,
    ) -> Option<Self> {
        match directory.relationship(primary_repo, secondary_repo) {
            Relationship::Child => directory
                .path_in_parent(secondary_repo)
                .map(|path| Direction::ToChild { path: path.to_string() }),
            Relationship::Parent => directory
                .path_in_parent(primary_repo)
                .map(|path| Direction::ToParent { path: path.to_string() }),
            Relationship::None => None,
        }
    }

    /// Subdirectory replayed commits are read from.
    pub fn source_sub_path(&self) -> Option<&str> {
        match self {
            Direction::ToChild { path } => Some(path.as_str()),
            Direction::ToParent { .. } => None,
        }
    }

    /// Subdirectory replayed commits are written to.
    pub fn target_sub_path(&self) -> Option<&str> {
        match self {
            Direction::ToChild { .. } => None,
            Direction::ToParent { path } => Some(path.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub bot_signature: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bot_signature: DEFAULT_BOT_SIGNATURE.to_string(),
        }
    }
}

/// Title used when a parent-bound PR carries no `publicTitle`.
pub fn generic_title(primary: &PullRequestRef) -> String {
    format!("Sync changes from {primary}")
}

/// Title and body of the secondary PR for `direction`, before the meta block.
pub fn compose_title_and_body(
    direction: &Direction,
    primary: &PullRequestInfo,
    settings: &PipelineSettings,
) -> (String, String) {
    match direction {
        Direction::ToChild { path } => {
            let body = format!(
                "This pull request mirrors {} for the `{}/` subtree.\n\
                 Changes should be made on the original pull request; they are replayed here.\n\n{}",
                primary.url, path, settings.bot_signature
            );
            (primary.title.clone(), body)
        }
        Direction::ToParent { .. } => {
            let block = meta::parse_pr_body_meta(&primary.body);
            let title = match block.text(PUBLIC_TITLE_KEY).map(str::trim) {
                Some(SAME_TITLE_SENTINEL) => primary.title.clone(),
                Some(title) if !title.is_empty() => title.to_string(),
                _ => generic_title(&primary.reference()),
            };
            let body = block.text(PUBLIC_BODY_KEY).unwrap_or_default().to_string();
            (title, body)
        }
    }
}

/// Outcome of the base-resolution step.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BranchPlan {
    base_sha: String,
    /// Head of a secondary branch left by an earlier run.
    existing_sha: Option<String>,
}

macro_rules! next_step {
    ($abort:ident, $step:expr, $flow:expr) => {
        match $flow {
            Flow::Continue(value) => value,
            Flow::Stop(reason) => return Ok($abort($step, reason)),
        }
    };
}

fn aborted(
    primary: &PullRequestRef,
    secondary_repo: &str,
    step: PipelineStep,
    reason: String,
) -> PipelineOutcome {
    METRICS.inc_pipeline_aborts();
    obs::emit_secondary_aborted(primary, secondary_repo, step, &reason);
    PipelineOutcome::Aborted { step, reason }
}

pub struct SecondaryPipeline {
    api: Arc<dyn PullRequestApi>,
    copier: Arc<dyn CommitCopier>,
    directory: Arc<RelationshipDirectory>,
    settings: PipelineSettings,
}

impl SecondaryPipeline {
    pub fn new(
        api: Arc<dyn PullRequestApi>,
        copier: Arc<dyn CommitCopier>,
        directory: Arc<RelationshipDirectory>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            api,
            copier,
            directory,
            settings,
        }
    }

    /// Create the secondary PR mirroring `primary_ref` in `secondary_repo`.
    pub async fn create_secondary_pr(
        &self,
        primary_ref: &PullRequestRef,
        secondary_repo: &str,
    ) -> SyncResult<PipelineOutcome> {
        let abort = |step, reason| aborted(primary_ref, secondary_repo, step, reason);

        let direction = next_step!(
            abort,
            PipelineStep::ResolveDirection,
            self.resolve_direction(&primary_ref.repo_name, secondary_repo)
        );
        let primary = next_step!(
            abort,
            PipelineStep::FetchPrimary,
            self.fetch_primary(primary_ref).await?
        );
        let branch = branch_name::encode(primary_ref);
        let plan = next_step!(
            abort,
            PipelineStep::ResolveBase,
            self.resolve_base(&primary, secondary_repo, &branch).await?
        );

        // A residual branch may hold a partial replay or sit on an older base;
        // it is moved back to the current base so the full range is replayed.
        let branch_reused = plan.existing_sha.is_some();
        match plan.existing_sha.as_deref() {
            Some(sha) if sha == plan.base_sha => {
                info!(repo = %secondary_repo, branch = %branch, "reusing existing secondary branch");
            }
            Some(sha) => {
                info!(
                    repo = %secondary_repo,
                    branch = %branch,
                    from = %sha,
                    to = %plan.base_sha,
                    "resetting residual secondary branch to base"
                );
                self.api
                    .reset_branch(secondary_repo, &branch, &plan.base_sha)
                    .await?;
            }
            None => {
                self.api
                    .create_branch(secondary_repo, &branch, &plan.base_sha)
                    .await?;
            }
        }

        let (title, body) = compose_title_and_body(&direction, &primary, &self.settings);

        let source = CopySource {
            repo_name: primary.repo_name.clone(),
            before_sha: primary.base_sha.clone(),
            after_sha: primary.head_sha.clone(),
            sub_path: direction.source_sub_path().map(str::to_string),
        };
        let target = CopyTarget {
            repo_name: secondary_repo.to_string(),
            branch: branch.clone(),
            sha: plan.base_sha.clone(),
            sub_path: direction.target_sub_path().map(str::to_string),
            generic_message: match direction {
                Direction::ToParent { .. } => Some(title.clone()),
                Direction::ToChild { .. } => None,
            },
        };
        self.copier.copy_commits(&source, &target).await?;

        let body = meta::upsert_pr_body_meta(&body, PRIMARY_SHA_KEY, &primary.head_sha);
        let pull_request = self
            .api
            .create_pull_request(secondary_repo, &branch, &primary.base_branch, &title, &body)
            .await?;

        if matches!(direction, Direction::ToParent { .. }) {
            let comment = format!(
                "This pull request is synchronized to {}.\n\n{}",
                pull_request.url, self.settings.bot_signature
            );
            self.api
                .create_issue_comment(&primary.repo_name, primary.number, &comment)
                .await?;
        }

        METRICS.inc_secondary_created();
        obs::emit_secondary_created(primary_ref, &pull_request.reference(), branch_reused);

        Ok(PipelineOutcome::Created {
            pull_request,
            branch_reused,
        })
    }

    fn resolve_direction(&self, primary_repo: &str, secondary_repo: &str) -> Flow<Direction> {
        match Direction::resolve(&self.directory, primary_repo, secondary_repo) {
            Some(direction) => Flow::Continue(direction),
            None => Flow::Stop(format!(
                "{primary_repo} and {secondary_repo} are not related"
            )),
        }
    }

    async fn fetch_primary(&self, primary: &PullRequestRef) -> SyncResult<Flow<PullRequestInfo>> {
        Ok(
            match self
                .api
                .fetch_pr_by_number(&primary.repo_name, primary.number)
                .await?
            {
                Some(info) => Flow::Continue(info),
                None => Flow::Stop(format!("primary {primary} does not exist")),
            },
        )
    }

    async fn resolve_base(
        &self,
        primary: &PullRequestInfo,
        secondary_repo: &str,
        branch: &str,
    ) -> SyncResult<Flow<BranchPlan>> {
        let (base_sha, existing_sha) = tokio::try_join!(
            self.api.fetch_ref(secondary_repo, &primary.base_branch),
            self.api.fetch_ref(secondary_repo, branch),
        )?;
        Ok(match base_sha {
            Some(base_sha) => Flow::Continue(BranchPlan {
                base_sha,
                existing_sha,
            }),
            None => Flow::Stop(format!(
                "base branch {} does not exist in {secondary_repo}",
                primary.base_branch
            )),
        })
    }
}
