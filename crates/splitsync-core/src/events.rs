//! Webhook routing: turns GitHub deliveries into sync targets.
//!
//! Handles `pull_request`, `push` and `status` events. Force pushes are not
//! supported and are skipped with a warning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::SyncResult;
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestrator::SyncTarget;
use crate::status::AggregateContext;

const SYNCED_PR_ACTIONS: &[&str] = &[
    "opened",
    "reopened",
    "synchronize",
    "closed",
    "edited",
    "ready_for_review",
];

/// One recorded webhook delivery, as stored one-per-line in a JSONL file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Value of the `X-GitHub-Event` header.
    pub event: String,
    pub payload: Value,
}

/// What to do with a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "routing", rename_all = "snake_case")]
pub enum Routing {
    Targets { targets: Vec<SyncTarget> },
    /// Irrelevant to syncing.
    Ignored { reason: String },
    /// Relevant but unsupported.
    Skipped { reason: String },
}

impl Routing {
    fn ignored(reason: impl Into<String>) -> Self {
        Routing::Ignored {
            reason: reason.into(),
        }
    }

    pub fn targets(&self) -> &[SyncTarget] {
        match self {
            Routing::Targets { targets } => targets,
            _ => &[],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestNumber {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: String,
    pull_request: PullRequestNumber,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    git_ref: String,
    #[serde(default)]
    forced: bool,
    #[serde(default)]
    deleted: bool,
    repository: Repository,
}

#[derive(Debug, Deserialize)]
struct StatusBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatusEvent {
    context: String,
    #[serde(default)]
    branches: Vec<StatusBranch>,
    repository: Repository,
}

#[derive(Debug, Clone, Default)]
pub struct EventRouter {
    aggregate: AggregateContext,
}

impl EventRouter {
    /// `aggregate` identifies status events produced by splitsync itself.
    pub fn new(aggregate: AggregateContext) -> Self {
        Self { aggregate }
    }

    pub fn route_delivery(&self, delivery: &Delivery) -> SyncResult<Routing> {
        self.route(&delivery.event, &delivery.payload)
    }

    /// Route one event. A payload missing required fields is an error.
    pub fn route(&self, event: &str, payload: &Value) -> SyncResult<Routing> {
        let routing = match event {
            "pull_request" => self.route_pull_request(serde_json::from_value(payload.clone())?),
            "push" => self.route_push(serde_json::from_value(payload.clone())?),
            "status" => self.route_status(serde_json::from_value(payload.clone())?),
            other => Routing::ignored(format!("unhandled event {other}")),
        };
        debug!(event = %event, routing = ?routing, "routed delivery");
        Ok(routing)
    }

    fn route_pull_request(&self, event: PullRequestEvent) -> Routing {
        if !SYNCED_PR_ACTIONS.contains(&event.action.as_str()) {
            return Routing::ignored(format!("pull_request action {}", event.action));
        }
        Routing::Targets {
            targets: vec![SyncTarget::pull_request(
                event.repository.full_name,
                event.pull_request.number,
            )],
        }
    }

    fn route_push(&self, event: PushEvent) -> Routing {
        let Some(branch) = event.git_ref.strip_prefix("refs/heads/") else {
            return Routing::ignored(format!("push to {}", event.git_ref));
        };
        if event.deleted {
            return Routing::ignored(format!("branch {branch} deleted"));
        }
        if event.forced {
            let reason = format!("force push to {branch} is not supported");
            METRICS.inc_force_pushes_skipped();
            obs::emit_delivery_skipped("push", &event.repository.full_name, &reason);
            return Routing::Skipped { reason };
        }
        Routing::Targets {
            targets: vec![SyncTarget::branch(event.repository.full_name, branch)],
        }
    }

    fn route_status(&self, event: StatusEvent) -> Routing {
        if self.aggregate.matches(&event.context) {
            return Routing::ignored(format!("aggregate status {}", event.context));
        }
        if event.branches.is_empty() {
            return Routing::ignored("status on a commit outside any branch");
        }
        let repo = event.repository.full_name;
        Routing::Targets {
            targets: event
                .branches
                .into_iter()
                .map(|b| SyncTarget::branch(repo.clone(), b.name))
                .collect(),
        }
    }
}
