//! End-to-end sync scenarios against the in-memory GitHub fake.
//!
//! Covers:
//! - secondary creation in a child repository from a parent PR
//! - secondary creation in the parent from a child PR, with meta overrides
//! - abort on a missing base branch, then recovery on re-run
//! - status mirroring and its idempotence
//! - merge and close propagation
//! - title flow from a parent primary only
//! - webhook deliveries driving the orchestrator

use std::sync::Arc;

use splitsync_core::fakes::{pr_fixture, MemoryGitHub, RecordingCopier};
use splitsync_core::meta::PRIMARY_SHA_KEY;
use splitsync_core::{
    branch_name, parse_pr_body_meta, CommitStatus, EventRouter, PipelineOutcome, PipelineStep,
    PrState, PullRequestRef, RelationshipDirectory, StatusState, SyncConfig,
    SyncOrchestrator, SyncReport, SyncTarget,
};

const SIGNATURE: &str = "-- mirrored by splitsync";

fn config() -> SyncConfig {
    SyncConfig::from_toml_str(&format!(
        r#"
[[repositories]]
name = "org/parent"

[[repositories]]
name = "org/api"
parent = "org/parent"
path = "services/api"

[[repositories]]
name = "org/web"
parent = "org/parent"
path = "apps/web"

[pipeline]
bot_signature = "{SIGNATURE}"
"#
    ))
    .expect("valid config")
}

struct Harness {
    host: Arc<MemoryGitHub>,
    copier: Arc<RecordingCopier>,
    orchestrator: SyncOrchestrator,
}

fn harness() -> Harness {
    let host = MemoryGitHub::shared();
    let copier = Arc::new(RecordingCopier::advancing(host.clone()));
    let config = config();
    let directory: RelationshipDirectory = config.directory().expect("valid directory");
    let orchestrator = SyncOrchestrator::new(
        host.clone(),
        copier.clone(),
        Arc::new(directory),
        config.settings(),
    );
    Harness {
        host,
        copier,
        orchestrator,
    }
}

fn created(report: SyncReport) -> splitsync_core::PullRequestInfo {
    match report {
        SyncReport::Secondary(PipelineOutcome::Created { pull_request, .. }) => pull_request,
        other => panic!("expected a created secondary, got {other:?}"),
    }
}

// ---- Secondary creation ----

#[tokio::test]
async fn parent_pr_touching_child_subtree_creates_child_secondary() {
    let h = harness();
    h.host.add_pr(pr_fixture("org/parent", 42, "api-fix", "main"));
    h.host.set_files(
        "org/parent",
        42,
        &["services/api/src/handler.rs", "services/api/Cargo.toml"],
    );
    h.host.set_ref("org/api", "main", "api-main-head");

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/parent", 42))
        .await
        .unwrap();
    let secondary = created(report);

    assert_eq!(secondary.repo_name, "org/api");
    assert_eq!(secondary.head_branch, "org/parent/42");
    assert_eq!(secondary.base_branch, "main");
    assert!(secondary.body.contains(SIGNATURE));
    assert!(secondary.body.contains("https://github.com/org/parent/pull/42"));

    let create_branch = h
        .host
        .writes()
        .into_iter()
        .find(|c| c.op == "create_branch")
        .unwrap();
    assert_eq!(create_branch.args, vec!["org/api", "org/parent/42", "api-main-head"]);

    let copies = h.copier.copies();
    assert_eq!(copies.len(), 1);
    let (source, target) = &copies[0];
    assert_eq!(source.repo_name, "org/parent");
    assert_eq!(source.sub_path.as_deref(), Some("services/api"));
    assert_eq!(source.before_sha, "org/parent-main-base");
    assert_eq!(source.after_sha, "org/parent-42-head");
    assert_eq!(target.sub_path, None);

    // The branch name leads back to the primary.
    assert_eq!(
        branch_name::decode(&secondary.head_branch),
        Some(PullRequestRef::new("org/parent", 42))
    );
}

#[tokio::test]
async fn child_pr_creates_parent_secondary_with_public_meta() {
    let h = harness();
    let mut primary = pr_fixture("org/web", 9, "css", "main");
    primary.title = "Internal: tweak css".into();
    primary.body = "Details for the team.\n\n<!-- meta:\n  publicTitle: Improve layout\n  publicBody: Spacing fixes.\\nNo behaviour change.\n-->".into();
    h.host.add_pr(primary);
    h.host.set_ref("org/parent", "main", "parent-main-head");

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/web", 9))
        .await
        .unwrap();
    let secondary = created(report);

    assert_eq!(secondary.repo_name, "org/parent");
    assert_eq!(secondary.head_branch, "org/web/9");
    assert_eq!(secondary.title, "Improve layout");
    assert!(secondary.body.starts_with("Spacing fixes.\nNo behaviour change."));

    let (_, target) = &h.copier.copies()[0];
    assert_eq!(target.sub_path.as_deref(), Some("apps/web"));
    assert_eq!(target.generic_message.as_deref(), Some("Improve layout"));

    let comments = h.host.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].0, "org/web");
    assert!(comments[0].2.contains(&secondary.url));
}

#[tokio::test]
async fn missing_base_branch_aborts_then_recovers_on_rerun() {
    let h = harness();
    h.host.add_pr(pr_fixture("org/parent", 5, "fix", "release-2"));
    h.host.set_files("org/parent", 5, &["services/api/lib.rs"]);

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/parent", 5))
        .await
        .unwrap();
    assert!(matches!(
        report,
        SyncReport::Secondary(PipelineOutcome::Aborted {
            step: PipelineStep::ResolveBase,
            ..
        })
    ));
    assert!(h.host.writes().is_empty());
    assert!(h.host.prs_in("org/api").is_empty());

    h.host.set_ref("org/api", "release-2", "api-release-head");
    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/parent", 5))
        .await
        .unwrap();
    assert_eq!(created(report).base_branch, "release-2");
}

#[tokio::test]
async fn failed_replay_leaves_branch_that_next_run_reuses() {
    let host = MemoryGitHub::shared();
    let config = config();
    let directory = Arc::new(config.directory().unwrap());
    host.add_pr(pr_fixture("org/parent", 6, "fix", "main"));
    host.set_files("org/parent", 6, &["services/api/lib.rs"]);
    host.set_ref("org/api", "main", "api-main-head");

    let failing = SyncOrchestrator::new(
        host.clone(),
        Arc::new(RecordingCopier::failing()),
        directory.clone(),
        config.settings(),
    );
    assert!(failing
        .sync(&SyncTarget::pull_request("org/parent", 6))
        .await
        .is_err());
    assert_eq!(
        host.ref_sha("org/api", "org/parent/6").as_deref(),
        Some("api-main-head")
    );

    let working = SyncOrchestrator::new(
        host.clone(),
        Arc::new(RecordingCopier::advancing(host.clone())),
        directory,
        config.settings(),
    );
    let report = working
        .sync(&SyncTarget::pull_request("org/parent", 6))
        .await
        .unwrap();
    match report {
        SyncReport::Secondary(PipelineOutcome::Created { branch_reused, .. }) => {
            assert!(branch_reused)
        }
        other => panic!("unexpected report {other:?}"),
    }
}

#[tokio::test]
async fn unrelated_repository_is_a_silent_no_op() {
    let h = harness();
    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("someone/else", 1))
        .await
        .unwrap();
    assert_eq!(report, SyncReport::NotConfigured);
    assert!(h.host.calls().is_empty());
}

// ---- Existing pairs ----

async fn seeded_pair(h: &Harness) -> splitsync_core::PullRequestInfo {
    h.host.add_pr(pr_fixture("org/parent", 42, "api-fix", "main"));
    h.host.set_files("org/parent", 42, &["services/api/src/lib.rs"]);
    h.host.set_ref("org/api", "main", "api-main-head");
    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/parent", 42))
        .await
        .unwrap();
    created(report)
}

#[tokio::test]
async fn status_is_mirrored_once() {
    let h = harness();
    let secondary = seeded_pair(&h).await;
    h.host.set_statuses(
        "org/parent",
        "org/parent-42-head",
        vec![
            CommitStatus::new("ci/unit", StatusState::Success),
            CommitStatus::new("ci/lint", StatusState::Failure),
        ],
    );

    let first = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/parent", 42))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = first else {
        panic!("expected a synced pair");
    };
    assert_eq!(pair.pair.secondary, secondary.reference());
    assert_eq!(pair.status.aggregated, StatusState::Failure);
    assert!(pair.status.written);
    assert_eq!(
        h.host.statuses("org/api", &secondary.head_sha),
        vec![CommitStatus::new("splitsync/aggregate", StatusState::Failure)]
    );

    h.host.clear_calls();
    let again = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/api", secondary.number))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = again else {
        panic!("expected a synced pair");
    };
    assert!(!pair.status.written);
    assert!(h.host.writes().is_empty());
}

#[tokio::test]
async fn pushed_commits_replay_from_recorded_sha() {
    let h = harness();
    let secondary = seeded_pair(&h).await;
    assert_eq!(
        parse_pr_body_meta(&secondary.body).text(PRIMARY_SHA_KEY),
        Some("org/parent-42-head")
    );

    let mut primary = h.host.pr("org/parent", 42).unwrap();
    primary.head_sha = "org/parent-42-second".into();
    h.host.add_pr(primary);

    let report = h
        .orchestrator
        .sync(&SyncTarget::branch("org/parent", "api-fix"))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = report else {
        panic!("expected a synced pair");
    };
    assert!(pair.commits_replayed);

    let copies = h.copier.copies();
    let (source, target) = copies.last().unwrap();
    assert_eq!(source.before_sha, "org/parent-42-head");
    assert_eq!(source.after_sha, "org/parent-42-second");
    assert_eq!(target.branch, "org/parent/42");

    let updated = h.host.pr("org/api", secondary.number).unwrap();
    assert_eq!(
        parse_pr_body_meta(&updated.body).text(PRIMARY_SHA_KEY),
        Some("org/parent-42-second")
    );
}

#[tokio::test]
async fn merging_the_primary_merges_the_secondary() {
    let h = harness();
    let secondary = seeded_pair(&h).await;
    let mut primary = h.host.pr("org/parent", 42).unwrap();
    primary.state = PrState::Merged;
    h.host.add_pr(primary);

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/parent", 42))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = report else {
        panic!("expected a synced pair");
    };
    assert!(pair.merged);
    assert_eq!(
        h.host.pr("org/api", secondary.number).unwrap().state,
        PrState::Merged
    );
}

#[tokio::test]
async fn closing_the_secondary_closes_the_primary() {
    let h = harness();
    let mut secondary = seeded_pair(&h).await;
    secondary.state = PrState::Closed;
    h.host.add_pr(secondary.clone());

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/api", secondary.number))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = report else {
        panic!("expected a synced pair");
    };
    assert!(!pair.open);
    assert_eq!(h.host.pr("org/parent", 42).unwrap().state, PrState::Closed);
}

#[tokio::test]
async fn merged_secondary_leaves_open_primary_alone() {
    let h = harness();
    let mut secondary = seeded_pair(&h).await;
    secondary.state = PrState::Merged;
    h.host.add_pr(secondary.clone());
    h.host.clear_calls();

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/parent", 42))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = report else {
        panic!("expected a synced pair");
    };
    assert!(pair.merged);
    assert_eq!(h.host.pr("org/parent", 42).unwrap().state, PrState::Open);
    assert!(h
        .host
        .writes()
        .iter()
        .all(|c| c.op == "set_commit_status"));
}

#[tokio::test]
async fn closed_pair_stays_closed_without_writes() {
    let h = harness();
    let mut secondary = seeded_pair(&h).await;
    secondary.state = PrState::Closed;
    h.host.add_pr(secondary.clone());
    let mut primary = h.host.pr("org/parent", 42).unwrap();
    primary.state = PrState::Closed;
    h.host.add_pr(primary);
    h.host.clear_calls();

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/api", secondary.number))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = report else {
        panic!("expected a synced pair");
    };
    assert!(!pair.merged);
    assert!(!pair.open);
    assert!(!h
        .host
        .writes()
        .iter()
        .any(|c| c.op == "set_pull_request_state"));
}

#[tokio::test]
async fn retitled_child_primary_keeps_parent_title() {
    let h = harness();
    h.host.add_pr(pr_fixture("org/web", 9, "css", "main"));
    h.host.set_ref("org/parent", "main", "parent-main-head");
    let secondary = created(
        h.orchestrator
            .sync(&SyncTarget::pull_request("org/web", 9))
            .await
            .unwrap(),
    );

    let mut primary = h.host.pr("org/web", 9).unwrap();
    primary.title = "Renamed upstream".into();
    h.host.add_pr(primary);
    h.host.clear_calls();

    let report = h
        .orchestrator
        .sync(&SyncTarget::pull_request("org/web", 9))
        .await
        .unwrap();
    let SyncReport::Synced(pair) = report else {
        panic!("expected a synced pair");
    };
    assert!(pair.open);
    assert!(!pair.title_updated);
    assert_eq!(
        h.host.pr("org/parent", secondary.number).unwrap().title,
        secondary.title
    );
    assert!(!h.host.writes().iter().any(|c| c.op == "update_pull_request"));
}

// ---- Webhook deliveries ----

#[tokio::test]
async fn deliveries_route_into_syncs_and_force_pushes_are_skipped() {
    let h = harness();
    seeded_pair(&h).await;
    h.host.clear_calls();
    let router = EventRouter::new(config().settings().aggregate);

    let forced = serde_json::json!({
        "ref": "refs/heads/api-fix",
        "forced": true,
        "repository": { "full_name": "org/parent" }
    });
    let routing = router.route("push", &forced).unwrap();
    assert!(routing.targets().is_empty());
    assert!(h.host.calls().is_empty());

    let opened = serde_json::json!({
        "action": "synchronize",
        "pull_request": { "number": 42 },
        "repository": { "full_name": "org/parent" }
    });
    let routing = router.route("pull_request", &opened).unwrap();
    for target in routing.targets() {
        let report = h.orchestrator.sync(target).await.unwrap();
        assert_eq!(report.kind(), "synced");
    }
}
