//! Partner resolution: which PR in a related repository mirrors this one.
//!
//! Resolution is branch-name first. A PR whose head branch decodes to a live
//! PR is the secondary of that PR. Otherwise every related repository is
//! searched for a PR on the branch that would mirror this one, in which case
//! this PR is the primary.

use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::PullRequestApi;
use crate::branch_name;
use crate::error::SyncResult;
use crate::model::{PullRequestInfo, PullRequestRef, SyncPair};
use crate::obs;
use crate::relationships::{Relationship, RelationshipDirectory};

/// Role of the PR that was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Secondary,
}

/// How the partner was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The PR's own head branch named its primary.
    EncodedBranch,
    /// A related repository had a PR on this PR's encoded branch name.
    ForwardSearch,
    /// A related repository had a PR on the same head branch.
    LegacyBranch,
}

/// A resolved partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub pair: SyncPair,
    /// Role of the PR passed to [`PartnerResolver::resolve`].
    pub role: Role,
    pub resolution: Resolution,
}

impl Partner {
    /// The other side of the pair.
    pub fn partner_ref(&self) -> &PullRequestRef {
        match self.role {
            Role::Primary => &self.pair.secondary,
            Role::Secondary => &self.pair.primary,
        }
    }
}

pub struct PartnerResolver {
    api: Arc<dyn PullRequestApi>,
    directory: Arc<RelationshipDirectory>,
    legacy_branch_lookup: bool,
}

impl PartnerResolver {
    pub fn new(api: Arc<dyn PullRequestApi>, directory: Arc<RelationshipDirectory>) -> Self {
        Self {
            api,
            directory,
            legacy_branch_lookup: false,
        }
    }

    /// Also match PRs that share `pr`'s head branch name in a related
    /// repository. Such pairs predate encoded branch names.
    pub fn with_legacy_lookup(mut self, enabled: bool) -> Self {
        self.legacy_branch_lookup = enabled;
        self
    }

    /// Find the PR linked to `pr`, or `None` when no partner exists yet.
    pub async fn resolve(&self, pr: &PullRequestInfo) -> SyncResult<Option<Partner>> {
        let this = pr.reference();

        if let Some(candidate) = branch_name::decode(&pr.head_branch) {
            debug!(pr = %this, candidate = %candidate, "head branch names a candidate primary");
            if self
                .api
                .fetch_pr_by_number(&candidate.repo_name, candidate.number)
                .await?
                .is_some()
            {
                return Ok(Some(self.found(
                    SyncPair::new(candidate, this),
                    Role::Secondary,
                    Resolution::EncodedBranch,
                )));
            }
            debug!(pr = %this, "candidate primary no longer exists, searching forward");
        }

        let encoded = branch_name::encode(&this);
        let related = self.directory.related_repo_names(&pr.repo_name);
        if let Some(secondary) = self.first_match(&related, &encoded).await? {
            return Ok(Some(self.found(
                SyncPair::new(this, secondary.reference()),
                Role::Primary,
                Resolution::ForwardSearch,
            )));
        }

        if self.legacy_branch_lookup && !branch_name::is_encoded(&pr.head_branch) {
            if let Some(other) = self.first_match(&related, &pr.head_branch).await? {
                let other_ref = other.reference();
                // The parent side was authoritative before branch encoding.
                let (pair, role) = match self.directory.relationship(&pr.repo_name, &other.repo_name)
                {
                    Relationship::Parent => (SyncPair::new(other_ref, this), Role::Secondary),
                    _ => (SyncPair::new(this, other_ref), Role::Primary),
                };
                return Ok(Some(self.found(pair, role, Resolution::LegacyBranch)));
            }
        }

        debug!(pr = %this, "no partner found");
        Ok(None)
    }

    /// First PR on `branch` across `repos`, honoring `repos` order.
    ///
    /// The lookups are read-only and run concurrently.
    async fn first_match(
        &self,
        repos: &[&str],
        branch: &str,
    ) -> SyncResult<Option<PullRequestInfo>> {
        let lookups = repos
            .iter()
            .map(|repo| self.api.fetch_pr_by_branch(repo, branch, true));
        let found = try_join_all(lookups).await?;
        Ok(found.into_iter().flatten().next())
    }

    fn found(&self, pair: SyncPair, role: Role, resolution: Resolution) -> Partner {
        obs::emit_partner_resolved(&pair.primary, &pair.secondary, resolution);
        Partner {
            pair,
            role,
            resolution,
        }
    }
}
