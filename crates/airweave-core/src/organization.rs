//! Organizations: the tenant boundary every other record is scoped to.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feature gates carried on an organization. Not consumed by any operation
/// in this crate today, but kept as an open enum so the context cache has
/// a real field to TTL-bound alongside plan data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureFlag {
    /// Organization may configure an S3-backed destination.
    S3Destination,
    /// Organization receives priority support routing.
    PrioritySupport,
}

/// Plan-defined limits consulted by the rate limiter and usage guardrail.
/// Missing plan data on a resolved organization is a data-integrity bug,
/// never a silently-permitted call — see `airweave-ratelimit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingPlan {
    /// Sliding-window request quota (N in the spec's N/W notation).
    pub rate_limit_quota: u32,
    /// Sliding-window length, in seconds (W).
    pub rate_limit_window_secs: u64,
    /// Per-action-type usage ceilings, keyed by `ActionType::as_str()`.
    pub usage_limits: std::collections::HashMap<String, u64>,
}

/// Tenant boundary. Every `Collection`, `SourceConnection`, `Sync`,
/// `SyncJob`, `IntegrationCredential`, and `UsageLedger` entry belongs to
/// exactly one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    id: Uuid,
    name: String,
    plan: Option<BillingPlan>,
    feature_flags: HashSet<FeatureFlag>,
}

impl Organization {
    /// Build an organization with no plan resolved yet.
    #[must_use]
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            plan: None,
            feature_flags: HashSet::new(),
        }
    }

    /// This organization's id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved billing plan, if one has been attached.
    #[must_use]
    pub const fn plan(&self) -> Option<&BillingPlan> {
        self.plan.as_ref()
    }

    /// Attach a resolved billing plan.
    #[must_use]
    pub fn with_plan(mut self, plan: BillingPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Whether a feature flag is enabled for this organization.
    #[must_use]
    pub fn has_feature(&self, flag: FeatureFlag) -> bool {
        self.feature_flags.contains(&flag)
    }

    /// Enable a feature flag.
    pub fn enable_feature(&mut self, flag: FeatureFlag) {
        self.feature_flags.insert(flag);
    }
}
