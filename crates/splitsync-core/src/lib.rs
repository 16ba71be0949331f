//! splitsync core library
//!
//! Keeps pull requests synchronized across repositories related as parent and
//! child (a monorepo and the repositories split out of it).

pub mod api;
pub mod branch_name;
pub mod config;
pub mod error;
pub mod events;
pub mod fakes;
pub mod meta;
pub mod metrics;
pub mod model;
pub mod obs;
pub mod orchestrator;
pub mod partner;
pub mod relationships;
pub mod secondary;
pub mod status;
pub mod telemetry;

pub use api::{CommitCopier, CopySource, CopyTarget, PullRequestApi};
pub use config::{GitHubSettings, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use events::{Delivery, EventRouter, Routing};
pub use meta::{parse_commit_meta, parse_pr_body_meta, MetaBlock, MetaValue};
pub use model::{
    CommitStatus, OpenState, PrState, PullRequestInfo, PullRequestRef, StatusState, SyncPair,
};
pub use orchestrator::{PairReport, SyncOrchestrator, SyncReport, SyncSettings, SyncTarget};
pub use partner::{Partner, PartnerResolver, Resolution, Role};
pub use relationships::{ChildRepo, Relationship, RelationshipDirectory, RepoEntry};
pub use secondary::{
    Direction, PipelineOutcome, PipelineSettings, PipelineStep, SecondaryPipeline,
};
pub use status::{aggregate_state, AggregateContext, StatusAggregator, StatusSyncOutcome};

pub use metrics::METRICS;
pub use obs::SyncSpan;
pub use telemetry::init_tracing;

/// splitsync version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
