//! Structured lifecycle events for sync runs.
//!
//! Every orchestration pass is instrumented with a [`SyncSpan`], so the events
//! below carry the `sync_id` of the pass that produced them.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, warn, Instrument, Span};
use uuid::Uuid;

use crate::model::{PullRequestRef, StatusState};
use crate::partner::Resolution;
use crate::secondary::PipelineStep;

/// Span for one orchestration pass, tagged with a fresh `sync_id`.
///
/// ```ignore
/// let span = SyncSpan::new("acme/widgets", "acme/widgets#42");
/// span.in_span(async { /* events carry sync_id */ }).await;
/// ```
pub struct SyncSpan {
    sync_id: Uuid,
    span: Span,
}

impl SyncSpan {
    pub fn new(repo: &str, target: &str) -> Self {
        let sync_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "splitsync.sync",
            sync_id = %sync_id,
            repo = %repo,
            target = %target,
        );
        Self { sync_id, span }
    }

    pub fn sync_id(&self) -> Uuid {
        self.sync_id
    }

    /// Run `fut` inside the span. The future stays `Send`.
    pub fn in_span<F: Future>(&self, fut: F) -> Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

pub fn emit_sync_started(target: &str) {
    info!(event = "sync.started", target = %target);
}

/// `outcome` is the short name of the report variant.
pub fn emit_sync_finished(target: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "sync.finished",
        target = %target,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

pub fn emit_partner_resolved(
    primary: &PullRequestRef,
    secondary: &PullRequestRef,
    resolution: Resolution,
) {
    info!(
        event = "partner.resolved",
        primary = %primary,
        secondary = %secondary,
        resolution = ?resolution,
    );
}

pub fn emit_status_written(secondary: &PullRequestRef, state: StatusState, previous: Option<StatusState>) {
    info!(
        event = "status.written",
        secondary = %secondary,
        state = %state,
        previous = ?previous,
    );
}

pub fn emit_secondary_created(primary: &PullRequestRef, secondary: &PullRequestRef, branch_reused: bool) {
    info!(
        event = "secondary.created",
        primary = %primary,
        secondary = %secondary,
        branch_reused = branch_reused,
    );
}

pub fn emit_secondary_aborted(
    primary: &PullRequestRef,
    secondary_repo: &str,
    step: PipelineStep,
    reason: &str,
) {
    info!(
        event = "secondary.aborted",
        primary = %primary,
        secondary_repo = %secondary_repo,
        step = %step,
        reason = %reason,
    );
}

/// A webhook delivery that is deliberately not processed (warning level).
pub fn emit_delivery_skipped(event: &str, repo: &str, reason: &str) {
    warn!(event = "delivery.skipped", github_event = %event, repo = %repo, reason = %reason);
}
