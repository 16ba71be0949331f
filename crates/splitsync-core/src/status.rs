//! Commit status aggregation from a primary PR onto its secondary.
//!
//! All status contexts on the primary's head commit are reduced to one state
//! by severity and written to the secondary's head commit under a single
//! aggregate context. A write only happens when the aggregate changed.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::api::PullRequestApi;
use crate::error::SyncResult;
use crate::metrics::METRICS;
use crate::model::{CommitStatus, PullRequestInfo, StatusState};
use crate::obs;

/// Default context name for aggregate statuses.
pub const DEFAULT_AGGREGATE_CONTEXT: &str = "splitsync/aggregate";

type ContextMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// The context aggregate statuses are written under, plus the predicate
/// recognising contexts produced by earlier aggregate writes.
///
/// Matching contexts are excluded from aggregation so a mirrored status never
/// feeds back into the next computation.
#[derive(Clone)]
pub struct AggregateContext {
    name: String,
    matcher: ContextMatcher,
}

impl AggregateContext {
    pub fn new(name: impl Into<String>, matcher: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            matcher: Arc::new(matcher),
        }
    }

    /// Write under `name` and treat every context ending in `name` as an aggregate.
    pub fn with_suffix(name: impl Into<String>) -> Self {
        let name = name.into();
        let suffix = name.clone();
        Self::new(name, move |context| context.ends_with(&suffix))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, context: &str) -> bool {
        (self.matcher)(context)
    }
}

impl Default for AggregateContext {
    fn default() -> Self {
        Self::with_suffix(DEFAULT_AGGREGATE_CONTEXT)
    }
}

impl fmt::Debug for AggregateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateContext")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Reduce statuses by severity: error > failure > pending/expected > success.
///
/// An empty set is a success.
pub fn aggregate_state<'a>(statuses: impl IntoIterator<Item = &'a CommitStatus>) -> StatusState {
    let mut any_failure = false;
    let mut any_pending = false;
    for status in statuses {
        match status.state {
            StatusState::Error => return StatusState::Error,
            StatusState::Failure => any_failure = true,
            StatusState::Expected | StatusState::Pending => any_pending = true,
            StatusState::Success => {}
        }
    }
    if any_failure {
        StatusState::Failure
    } else if any_pending {
        StatusState::Pending
    } else {
        StatusState::Success
    }
}

/// Result of one status sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSyncOutcome {
    pub aggregated: StatusState,
    /// Aggregate previously recorded on the secondary.
    pub previous: Option<StatusState>,
    pub written: bool,
}

pub struct StatusAggregator {
    api: Arc<dyn PullRequestApi>,
    context: AggregateContext,
}

impl StatusAggregator {
    pub fn new(api: Arc<dyn PullRequestApi>, context: AggregateContext) -> Self {
        Self { api, context }
    }

    pub fn context(&self) -> &AggregateContext {
        &self.context
    }

    /// Mirror the primary's aggregated status onto the secondary.
    ///
    /// Both status lists are fetched concurrently. Re-running with unchanged
    /// upstream statuses performs no writes.
    pub async fn sync_pr_statuses(
        &self,
        primary: &PullRequestInfo,
        secondary: &PullRequestInfo,
    ) -> SyncResult<StatusSyncOutcome> {
        let (primary_statuses, secondary_statuses) = tokio::try_join!(
            self.api
                .fetch_commit_statuses(&primary.repo_name, &primary.head_sha),
            self.api
                .fetch_commit_statuses(&secondary.repo_name, &secondary.head_sha),
        )?;

        let aggregated = aggregate_state(
            primary_statuses
                .iter()
                .filter(|s| !self.context.matches(&s.context)),
        );
        let previous = secondary_statuses
            .iter()
            .find(|s| self.context.matches(&s.context))
            .map(|s| s.state);

        if previous == Some(aggregated) {
            debug!(
                secondary = %secondary.reference(),
                state = %aggregated,
                "aggregate status unchanged"
            );
            METRICS.inc_status_writes_skipped();
            return Ok(StatusSyncOutcome {
                aggregated,
                previous,
                written: false,
            });
        }

        self.api
            .set_commit_status(
                &secondary.repo_name,
                &secondary.head_sha,
                self.context.name(),
                aggregated,
            )
            .await?;
        METRICS.inc_status_writes();
        obs::emit_status_written(&secondary.reference(), aggregated, previous);

        Ok(StatusSyncOutcome {
            aggregated,
            previous,
            written: true,
        })
    }
}
