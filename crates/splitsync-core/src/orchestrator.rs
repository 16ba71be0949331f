//! Sync orchestrator: the entry point for one sync of one PR.
//!
//! ```text
//! Resolving PR ──► Resolving partner ─┬─ none ──► candidate ──► SecondaryPipeline
//!                                     └─ found ─► status ─► merge ─► open-state ─► commits ─► title
//! ```
//!
//! Merge and open-state short-circuit the rest once the pair is no longer
//! active. Callers must serialize syncs per PR; nothing here locks.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{CommitCopier, CopySource, CopyTarget, PullRequestApi};
use crate::branch_name;
use crate::error::SyncResult;
use crate::meta::{self, PRIMARY_SHA_KEY};
use crate::metrics::METRICS;
use crate::model::{OpenState, PullRequestInfo, PullRequestRef, SyncPair};
use crate::obs::{self, SyncSpan};
use crate::partner::{PartnerResolver, Role};
use crate::relationships::{Relationship, RelationshipDirectory};
use crate::secondary::{Direction, PipelineOutcome, PipelineSettings, SecondaryPipeline};
use crate::status::{AggregateContext, StatusAggregator, StatusSyncOutcome};

/// What a sync was triggered for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncTarget {
    PullRequest(PullRequestRef),
    /// The open PR whose head is `branch`.
    Branch { repo_name: String, branch: String },
}

impl SyncTarget {
    pub fn pull_request(repo_name: impl Into<String>, number: u64) -> Self {
        SyncTarget::PullRequest(PullRequestRef::new(repo_name, number))
    }

    pub fn branch(repo_name: impl Into<String>, branch: impl Into<String>) -> Self {
        SyncTarget::Branch {
            repo_name: repo_name.into(),
            branch: branch.into(),
        }
    }

    pub fn repo_name(&self) -> &str {
        match self {
            SyncTarget::PullRequest(pr) => &pr.repo_name,
            SyncTarget::Branch { repo_name, .. } => repo_name,
        }
    }

    /// Serialization key: `repo#number` or `repo@branch`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTarget::PullRequest(pr) => write!(f, "{pr}"),
            SyncTarget::Branch { repo_name, branch } => write!(f, "{repo_name}@{branch}"),
        }
    }
}

/// Per-step results for an existing pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairReport {
    pub pair: SyncPair,
    pub status: StatusSyncOutcome,
    pub merged: bool,
    pub open: bool,
    pub commits_replayed: bool,
    pub title_updated: bool,
}

/// How one sync ended. Everything but an error is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncReport {
    /// The repository has no parent and no children.
    NotConfigured,
    PullRequestNotFound,
    /// No partner exists and none should be created.
    NoCandidate { reason: String },
    Secondary(PipelineOutcome),
    Synced(PairReport),
}

impl SyncReport {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncReport::NotConfigured => "not_configured",
            SyncReport::PullRequestNotFound => "pull_request_not_found",
            SyncReport::NoCandidate { .. } => "no_candidate",
            SyncReport::Secondary(PipelineOutcome::Created { .. }) => "secondary_created",
            SyncReport::Secondary(PipelineOutcome::Aborted { .. }) => "secondary_aborted",
            SyncReport::Synced(_) => "synced",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    pub aggregate: AggregateContext,
    pub pipeline: PipelineSettings,
    pub legacy_branch_lookup: bool,
}

#[derive(Debug, Clone, Copy)]
enum SyncState {
    ResolvingPullRequest,
    ResolvingPartner,
    ResolvingCandidate,
    CreatingSecondary,
    SyncingStatus,
    SyncingMerge,
    SyncingOpenState,
    SyncingCommits,
    SyncingTitle,
}

fn enter(state: SyncState) {
    debug!(state = ?state, "sync state");
}

pub struct SyncOrchestrator {
    api: Arc<dyn PullRequestApi>,
    copier: Arc<dyn CommitCopier>,
    directory: Arc<RelationshipDirectory>,
    resolver: PartnerResolver,
    statuses: StatusAggregator,
    pipeline: SecondaryPipeline,
}

impl SyncOrchestrator {
    pub fn new(
        api: Arc<dyn PullRequestApi>,
        copier: Arc<dyn CommitCopier>,
        directory: Arc<RelationshipDirectory>,
        settings: SyncSettings,
    ) -> Self {
        let resolver = PartnerResolver::new(Arc::clone(&api), Arc::clone(&directory))
            .with_legacy_lookup(settings.legacy_branch_lookup);
        let statuses = StatusAggregator::new(Arc::clone(&api), settings.aggregate);
        let pipeline = SecondaryPipeline::new(
            Arc::clone(&api),
            Arc::clone(&copier),
            Arc::clone(&directory),
            settings.pipeline,
        );
        Self {
            api,
            copier,
            directory,
            resolver,
            statuses,
            pipeline,
        }
    }

    pub fn directory(&self) -> &RelationshipDirectory {
        &self.directory
    }

    /// Run one sync for `target`.
    ///
    /// Repositories without any configured relationship return
    /// [`SyncReport::NotConfigured`] before any API call.
    pub async fn sync(&self, target: &SyncTarget) -> SyncResult<SyncReport> {
        let repo = target.repo_name();
        if !self.directory.has_parent(repo) && !self.directory.has_children(repo) {
            debug!(target = %target, "repository has no relationships, nothing to sync");
            return Ok(SyncReport::NotConfigured);
        }

        let key = target.key();
        let span = SyncSpan::new(repo, &key);
        span.in_span(async {
            METRICS.inc_syncs_started();
            obs::emit_sync_started(&key);
            let started = Instant::now();
            let report = self.run(target).await;
            if let Ok(report) = &report {
                obs::emit_sync_finished(&key, report.kind(), elapsed_ms(started));
            }
            report
        })
        .await
    }

    async fn run(&self, target: &SyncTarget) -> SyncResult<SyncReport> {
        enter(SyncState::ResolvingPullRequest);
        let Some(pr) = self.resolve_target(target).await? else {
            info!(target = %target, "pull request not found");
            return Ok(SyncReport::PullRequestNotFound);
        };

        enter(SyncState::ResolvingPartner);
        let partner = self.resolver.resolve(&pr).await?;
        match partner {
            Some(partner) => {
                let partner_ref = partner.partner_ref().clone();
                let Some(other) = self
                    .api
                    .fetch_pr_by_number(&partner_ref.repo_name, partner_ref.number)
                    .await?
                else {
                    return Ok(SyncReport::PullRequestNotFound);
                };
                let (primary, secondary) = match partner.role {
                    Role::Primary => (pr, other),
                    Role::Secondary => (other, pr),
                };
                self.sync_pair(partner.pair, &primary, &secondary)
                    .await
                    .map(SyncReport::Synced)
            }
            None => self.create_secondary(&pr).await,
        }
    }

    /// Map a target to the PR it names, if it still exists.
    pub async fn resolve_target(&self, target: &SyncTarget) -> SyncResult<Option<PullRequestInfo>> {
        match target {
            SyncTarget::PullRequest(pr) => {
                self.api.fetch_pr_by_number(&pr.repo_name, pr.number).await
            }
            SyncTarget::Branch { repo_name, branch } => {
                self.api.fetch_pr_by_branch(repo_name, branch, false).await
            }
        }
    }

    /// Key shared by every target that touches the same PR pair: the
    /// primary's `repo#number`.
    ///
    /// A PR on an encoded branch of a related repository maps to the primary
    /// that branch names, so `repo#n`, `repo@branch` and the partner's targets
    /// all collapse to one key. Unconfigured repositories and missing PRs fall
    /// back to [`SyncTarget::key`] without resolving anything further.
    pub async fn pair_key(&self, target: &SyncTarget) -> SyncResult<String> {
        let repo = target.repo_name();
        if !self.directory.has_parent(repo) && !self.directory.has_children(repo) {
            return Ok(target.key());
        }
        let Some(pr) = self.resolve_target(target).await? else {
            return Ok(target.key());
        };
        let primary = branch_name::decode(&pr.head_branch)
            .filter(|decoded| {
                self.directory.relationship(&pr.repo_name, &decoded.repo_name)
                    != Relationship::None
            })
            .unwrap_or_else(|| pr.reference());
        Ok(primary.to_string())
    }

    async fn create_secondary(&self, pr: &PullRequestInfo) -> SyncResult<SyncReport> {
        enter(SyncState::ResolvingCandidate);
        if !pr.is_open() {
            return Ok(no_candidate("pull request is not open"));
        }
        if branch_name::is_encoded(&pr.head_branch) {
            return Ok(no_candidate("head branch mirrors a primary that no longer exists"));
        }

        let candidate = match self.directory.parent_name(&pr.repo_name) {
            Some(parent) => Some(parent.to_string()),
            None => self.child_candidate(pr).await?,
        };
        let Some(candidate) = candidate else {
            return Ok(no_candidate("no changed file belongs to a child repository"));
        };

        enter(SyncState::CreatingSecondary);
        let outcome = self
            .pipeline
            .create_secondary_pr(&pr.reference(), &candidate)
            .await?;
        Ok(SyncReport::Secondary(outcome))
    }

    /// First child, in declared order, that owns any file the PR changes.
    async fn child_candidate(&self, pr: &PullRequestInfo) -> SyncResult<Option<String>> {
        let files = self.api.fetch_pr_files(&pr.repo_name, pr.number).await?;
        let owners: HashSet<String> = files
            .iter()
            .filter_map(|file| self.directory.child_for_path(&pr.repo_name, file))
            .map(|child| child.name)
            .collect();
        Ok(self
            .directory
            .children(&pr.repo_name)
            .into_iter()
            .map(|child| child.name)
            .find(|name| owners.contains(name)))
    }

    async fn sync_pair(
        &self,
        pair: SyncPair,
        primary: &PullRequestInfo,
        secondary: &PullRequestInfo,
    ) -> SyncResult<PairReport> {
        enter(SyncState::SyncingStatus);
        let status = self.statuses.sync_pr_statuses(primary, secondary).await?;
        let mut report = PairReport {
            pair,
            status,
            merged: false,
            open: false,
            commits_replayed: false,
            title_updated: false,
        };

        enter(SyncState::SyncingMerge);
        report.merged = self.sync_merge(primary, secondary).await?;
        if report.merged {
            return Ok(report);
        }

        enter(SyncState::SyncingOpenState);
        report.open = self.sync_open_state(primary, secondary).await?;
        if !report.open {
            return Ok(report);
        }

        let Some(direction) =
            Direction::resolve(&self.directory, &primary.repo_name, &secondary.repo_name)
        else {
            return Ok(report);
        };

        enter(SyncState::SyncingCommits);
        report.commits_replayed = self.sync_commits(primary, secondary, &direction).await?;

        enter(SyncState::SyncingTitle);
        report.title_updated = self
            .sync_title_and_body(primary, secondary, &direction)
            .await?;
        Ok(report)
    }

    /// Merge the secondary once its primary merged. Returns whether either
    /// side is merged.
    async fn sync_merge(
        &self,
        primary: &PullRequestInfo,
        secondary: &PullRequestInfo,
    ) -> SyncResult<bool> {
        if primary.is_merged() {
            if secondary.is_open() {
                let title = format!("{} (#{})", primary.title, secondary.number);
                let message = format!("Merged together with {}", primary.url);
                self.api
                    .merge_pull_request(&secondary.repo_name, secondary.number, &title, &message)
                    .await?;
                info!(primary = %primary.reference(), secondary = %secondary.reference(), "merged secondary");
            }
            return Ok(true);
        }
        if secondary.is_merged() {
            warn!(
                primary = %primary.reference(),
                secondary = %secondary.reference(),
                "secondary merged while its primary is not"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Close whichever side is still open once the other closed. Returns
    /// whether both sides are open.
    async fn sync_open_state(
        &self,
        primary: &PullRequestInfo,
        secondary: &PullRequestInfo,
    ) -> SyncResult<bool> {
        let still_open = match (primary.is_open(), secondary.is_open()) {
            (true, true) => return Ok(true),
            (false, false) => return Ok(false),
            (false, true) => secondary,
            (true, false) => primary,
        };
        self.api
            .set_pull_request_state(&still_open.repo_name, still_open.number, OpenState::Closed)
            .await?;
        info!(pr = %still_open.reference(), "closed pull request whose partner was closed");
        Ok(false)
    }

    /// Replay primary commits pushed since the last recorded replay.
    async fn sync_commits(
        &self,
        primary: &PullRequestInfo,
        secondary: &PullRequestInfo,
        direction: &Direction,
    ) -> SyncResult<bool> {
        let block = meta::parse_pr_body_meta(&secondary.body);
        let Some(recorded) = block.text(PRIMARY_SHA_KEY) else {
            debug!(secondary = %secondary.reference(), "no replay record, commit sync skipped");
            return Ok(false);
        };
        if recorded == primary.head_sha {
            return Ok(false);
        }

        let source = CopySource {
            repo_name: primary.repo_name.clone(),
            before_sha: recorded.to_string(),
            after_sha: primary.head_sha.clone(),
            sub_path: direction.source_sub_path().map(str::to_string),
        };
        let target = CopyTarget {
            repo_name: secondary.repo_name.clone(),
            branch: secondary.head_branch.clone(),
            sha: secondary.head_sha.clone(),
            sub_path: direction.target_sub_path().map(str::to_string),
            generic_message: match direction {
                Direction::ToParent { .. } => Some(secondary.title.clone()),
                Direction::ToChild { .. } => None,
            },
        };
        self.copier.copy_commits(&source, &target).await?;

        let body = meta::upsert_pr_body_meta(&secondary.body, PRIMARY_SHA_KEY, &primary.head_sha);
        self.api
            .update_pull_request(&secondary.repo_name, secondary.number, None, Some(&body))
            .await?;
        info!(
            secondary = %secondary.reference(),
            from = %recorded,
            to = %primary.head_sha,
            "replayed new primary commits"
        );
        Ok(true)
    }

    /// Mirror the title onto a child secondary. Parent-bound titles come from
    /// the meta block and are left alone.
    async fn sync_title_and_body(
        &self,
        primary: &PullRequestInfo,
        secondary: &PullRequestInfo,
        direction: &Direction,
    ) -> SyncResult<bool> {
        if !matches!(direction, Direction::ToChild { .. }) || secondary.title == primary.title {
            return Ok(false);
        }
        self.api
            .update_pull_request(&secondary.repo_name, secondary.number, Some(&primary.title), None)
            .await?;
        Ok(true)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn no_candidate(reason: &str) -> SyncReport {
    debug!(reason = %reason, "no secondary candidate");
    SyncReport::NoCandidate {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{pr_fixture, MemoryGitHub, RecordingCopier};
    use crate::model::PrState;
    use crate::relationships::RepoEntry;

    fn orchestrator(host: &Arc<MemoryGitHub>, copier: Arc<RecordingCopier>) -> SyncOrchestrator {
        let directory = RelationshipDirectory::new(vec![
            RepoEntry::root("org/parent"),
            RepoEntry::child("org/api", "org/parent", "services/api"),
            RepoEntry::child("org/web", "org/parent", "apps/web"),
            RepoEntry::root("org/solo"),
        ])
        .unwrap();
        SyncOrchestrator::new(host.clone(), copier, Arc::new(directory), SyncSettings::default())
    }

    /// org/parent#42 mirrored by org/api#1 on branch `org/parent/42`.
    fn seed_pair(host: &MemoryGitHub) -> (PullRequestInfo, PullRequestInfo) {
        let primary = pr_fixture("org/parent", 42, "fix", "main");
        let mut secondary = pr_fixture("org/api", 1, "org/parent/42", "main");
        secondary.title = primary.title.clone();
        secondary.body = meta::upsert_pr_body_meta("", PRIMARY_SHA_KEY, &primary.head_sha);
        host.add_pr(primary.clone());
        host.add_pr(secondary.clone());
        (primary, secondary)
    }

    #[test]
    fn test_elapsed_ms_of_fresh_instant_is_small() {
        assert!(elapsed_ms(Instant::now()) < 1_000);
    }

    #[test]
    fn test_target_keys() {
        assert_eq!(SyncTarget::pull_request("org/a", 3).key(), "org/a#3");
        assert_eq!(SyncTarget::branch("org/a", "feature").key(), "org/a@feature");
    }

    #[tokio::test]
    async fn test_pair_key_is_shared_by_all_targets_of_a_pair() {
        let host = MemoryGitHub::shared();
        seed_pair(&host);
        let orch = orchestrator(&host, Arc::new(RecordingCopier::new()));

        for target in [
            SyncTarget::pull_request("org/parent", 42),
            SyncTarget::branch("org/parent", "fix"),
            SyncTarget::pull_request("org/api", 1),
            SyncTarget::branch("org/api", "org/parent/42"),
        ] {
            assert_eq!(orch.pair_key(&target).await.unwrap(), "org/parent#42", "{target}");
        }
    }

    #[tokio::test]
    async fn test_pair_key_ignores_unrelated_encoded_branch() {
        let host = MemoryGitHub::shared();
        host.add_pr(pr_fixture("org/api", 4, "org/web/9", "main"));
        let orch = orchestrator(&host, Arc::new(RecordingCopier::new()));

        let key = orch.pair_key(&SyncTarget::pull_request("org/api", 4)).await.unwrap();
        assert_eq!(key, "org/api#4");
        let key = orch.pair_key(&SyncTarget::pull_request("org/solo", 1)).await.unwrap();
        assert_eq!(key, "org/solo#1");
        assert_eq!(host.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_repo_makes_no_calls() {
        let host = MemoryGitHub::shared();
        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/solo", 1))
            .await
            .unwrap();
        assert_eq!(report, SyncReport::NotConfigured);
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_pr_is_reported() {
        let host = MemoryGitHub::shared();
        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/parent", 99))
            .await
            .unwrap();
        assert_eq!(report, SyncReport::PullRequestNotFound);
    }

    #[tokio::test]
    async fn test_parent_pr_without_child_files_has_no_candidate() {
        let host = MemoryGitHub::shared();
        host.add_pr(pr_fixture("org/parent", 7, "docs", "main"));
        host.set_files("org/parent", 7, &["README.md"]);
        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/parent", 7))
            .await
            .unwrap();
        assert!(matches!(report, SyncReport::NoCandidate { .. }));
        assert!(host.writes().is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_secondary_never_spawns_another() {
        let host = MemoryGitHub::shared();
        host.add_pr(pr_fixture("org/api", 3, "org/parent/40", "main"));
        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/api", 3))
            .await
            .unwrap();
        assert!(matches!(report, SyncReport::NoCandidate { .. }));
        assert!(host.writes().is_empty());
    }

    #[tokio::test]
    async fn test_child_candidate_follows_declared_order() {
        let host = MemoryGitHub::shared();
        host.add_pr(pr_fixture("org/parent", 8, "both", "main"));
        host.set_files("org/parent", 8, &["apps/web/a.ts", "services/api/b.rs"]);
        let orch = orchestrator(&host, Arc::new(RecordingCopier::new()));
        let pr = host.pr("org/parent", 8).unwrap();
        assert_eq!(orch.child_candidate(&pr).await.unwrap().as_deref(), Some("org/api"));
    }

    #[tokio::test]
    async fn test_merged_primary_merges_secondary() {
        let host = MemoryGitHub::shared();
        let (mut primary, secondary) = seed_pair(&host);
        primary.state = PrState::Merged;
        host.add_pr(primary);

        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/parent", 42))
            .await
            .unwrap();

        let SyncReport::Synced(pair) = report else {
            panic!("expected a synced pair");
        };
        assert!(pair.merged);
        assert!(host.pr(&secondary.repo_name, secondary.number).unwrap().is_merged());
        let merge = host
            .writes()
            .into_iter()
            .find(|c| c.op == "merge_pull_request")
            .unwrap();
        assert_eq!(merge.args[2], "PR 42 (#1)");
    }

    #[tokio::test]
    async fn test_closed_primary_closes_secondary() {
        let host = MemoryGitHub::shared();
        let (mut primary, _) = seed_pair(&host);
        primary.state = PrState::Closed;
        host.add_pr(primary);

        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/api", 1))
            .await
            .unwrap();

        let SyncReport::Synced(pair) = report else {
            panic!("expected a synced pair");
        };
        assert!(!pair.merged);
        assert!(!pair.open);
        assert_eq!(host.pr("org/api", 1).unwrap().state, PrState::Closed);
    }

    #[tokio::test]
    async fn test_merged_secondary_with_open_primary_only_reports() {
        let host = MemoryGitHub::shared();
        let (_, mut secondary) = seed_pair(&host);
        secondary.state = PrState::Merged;
        host.add_pr(secondary);

        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/parent", 42))
            .await
            .unwrap();

        let SyncReport::Synced(pair) = report else {
            panic!("expected a synced pair");
        };
        assert!(pair.merged);
        assert!(!pair.commits_replayed);
        assert!(host.pr("org/parent", 42).unwrap().is_open());
        assert!(host
            .writes()
            .iter()
            .all(|c| c.op == "set_commit_status"));
    }

    #[tokio::test]
    async fn test_both_closed_changes_nothing() {
        let host = MemoryGitHub::shared();
        let (mut primary, mut secondary) = seed_pair(&host);
        primary.state = PrState::Closed;
        secondary.state = PrState::Closed;
        host.add_pr(primary);
        host.add_pr(secondary);

        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/parent", 42))
            .await
            .unwrap();

        let SyncReport::Synced(pair) = report else {
            panic!("expected a synced pair");
        };
        assert!(!pair.merged);
        assert!(!pair.open);
        assert!(!host.writes().iter().any(|c| c.op == "set_pull_request_state"));
    }

    #[tokio::test]
    async fn test_child_primary_title_is_not_pushed_to_parent() {
        let host = MemoryGitHub::shared();
        let mut primary = pr_fixture("org/api", 5, "fix", "main");
        primary.title = "Internal rename".into();
        let mut secondary = pr_fixture("org/parent", 9, "org/api/5", "main");
        secondary.title = "Public fix".into();
        secondary.body = meta::upsert_pr_body_meta("", PRIMARY_SHA_KEY, &primary.head_sha);
        host.add_pr(primary);
        host.add_pr(secondary);

        let report = orchestrator(&host, Arc::new(RecordingCopier::new()))
            .sync(&SyncTarget::pull_request("org/api", 5))
            .await
            .unwrap();

        let SyncReport::Synced(pair) = report else {
            panic!("expected a synced pair");
        };
        assert!(pair.open);
        assert!(!pair.title_updated);
        assert_eq!(host.pr("org/parent", 9).unwrap().title, "Public fix");
        assert!(!host.writes().iter().any(|c| c.op == "update_pull_request"));
    }

    #[tokio::test]
    async fn test_new_primary_commits_are_replayed() {
        let host = MemoryGitHub::shared();
        let copier = Arc::new(RecordingCopier::new());
        let (mut primary, _) = seed_pair(&host);
        primary.head_sha = "new-head".into();
        primary.title = "Renamed".into();
        host.add_pr(primary);

        let report = orchestrator(&host, copier.clone())
            .sync(&SyncTarget::pull_request("org/parent", 42))
            .await
            .unwrap();

        let SyncReport::Synced(pair) = report else {
            panic!("expected a synced pair");
        };
        assert!(pair.open);
        assert!(pair.commits_replayed);
        assert!(pair.title_updated);

        let copies = copier.copies();
        assert_eq!(copies[0].0.before_sha, "org/parent-42-head");
        assert_eq!(copies[0].0.after_sha, "new-head");
        assert_eq!(copies[0].1.branch, "org/parent/42");

        let updated = host.pr("org/api", 1).unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(
            meta::parse_pr_body_meta(&updated.body).text(PRIMARY_SHA_KEY),
            Some("new-head")
        );
    }

    #[tokio::test]
    async fn test_up_to_date_pair_only_touches_status() {
        let host = MemoryGitHub::shared();
        let copier = Arc::new(RecordingCopier::new());
        seed_pair(&host);
        let orch = orchestrator(&host, copier.clone());

        orch.sync(&SyncTarget::pull_request("org/parent", 42)).await.unwrap();
        host.clear_calls();
        orch.sync(&SyncTarget::branch("org/api", "org/parent/42")).await.unwrap();

        assert!(host.writes().is_empty());
        assert!(copier.copies().is_empty());
    }
}
