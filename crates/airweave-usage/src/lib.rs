//! Per-organization usage guardrail: enforce and account plan-defined
//! action quotas with buffered, threshold-flushed counters.

use std::collections::HashMap;
use std::sync::Mutex;

use airweave_core::{ActionType, Organization, UsageLedger};
use airweave_error::CoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Canonical flush order, fixed so flushes are never reordered across
/// action types even though individual increments arrive in any order.
const FLUSH_ORDER: [ActionType; 4] = [
    ActionType::Entities,
    ActionType::Queries,
    ActionType::SourceConnections,
    ActionType::TeamMembers,
];

/// The system of record a guardrail's buffer eventually flushes into.
/// Persistence itself (a database, the billing provider) is out of scope;
/// this is the narrow boundary the guardrail calls through.
#[async_trait]
pub trait UsageLedgerStore: Send + Sync {
    /// Apply a batch of signed deltas to the organization's ledger,
    /// atomically and in `FLUSH_ORDER`.
    async fn apply_deltas(
        &self,
        organization_id: Uuid,
        deltas: &[(ActionType, i64)],
    ) -> Result<(), CoreError>;

    /// The ledger's current persisted counts for an organization.
    async fn current_counts(&self, organization_id: Uuid) -> Result<UsageLedger, CoreError>;
}

/// An in-memory [`UsageLedgerStore`], used by tests and by a deployment
/// that has not yet wired a real ledger backend.
#[derive(Default)]
pub struct InMemoryUsageLedgerStore {
    ledgers: DashMap<Uuid, UsageLedger>,
}

impl InMemoryUsageLedgerStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLedgerStore for InMemoryUsageLedgerStore {
    async fn apply_deltas(
        &self,
        organization_id: Uuid,
        deltas: &[(ActionType, i64)],
    ) -> Result<(), CoreError> {
        let mut ledger = self
            .ledgers
            .entry(organization_id)
            .or_insert_with(|| UsageLedger::new(organization_id));
        for (action_type, delta) in deltas {
            ledger.apply_delta(*action_type, *delta);
        }
        Ok(())
    }

    async fn current_counts(&self, organization_id: Uuid) -> Result<UsageLedger, CoreError> {
        Ok(self
            .ledgers
            .get(&organization_id)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| UsageLedger::new(organization_id)))
    }
}

/// Contract a per-organization guardrail implements. `is_allowed` checks
/// without committing; `increment`/`decrement` buffer; `flush_all`
/// persists.
#[async_trait]
pub trait UsageGuardrail: Send + Sync {
    /// Whether `amount` more of `action_type` would stay within the
    /// organization's plan limit, accounting for buffered-but-unflushed
    /// deltas.
    ///
    /// # Errors
    /// Returns [`CoreError::DataIntegrity`] if the organization has no
    /// resolved plan, or [`CoreError::UsageLimitExceeded`] if admitting
    /// `amount` would exceed the plan limit.
    async fn is_allowed(&self, action_type: ActionType, amount: u64) -> Result<(), CoreError>;

    /// Buffer a positive delta. Flushes automatically once any action
    /// type's buffered magnitude reaches the configured threshold.
    async fn increment(&self, action_type: ActionType, amount: u64);

    /// Buffer a negative delta, for action types entities were removed
    /// from.
    async fn decrement(&self, action_type: ActionType, amount: u64);

    /// Persist all buffered deltas to the ledger now, in `FLUSH_ORDER`.
    ///
    /// # Errors
    /// Propagates whatever the underlying [`UsageLedgerStore`] returns.
    async fn flush_all(&self) -> Result<(), CoreError>;
}

/// Default [`UsageGuardrail`]: an in-memory buffer per action type,
/// flushed to a [`UsageLedgerStore`] when any type's buffered magnitude
/// reaches `threshold`, or on an explicit `flush_all`.
pub struct BufferedUsageGuardrail {
    organization: Organization,
    store: std::sync::Arc<dyn UsageLedgerStore>,
    threshold: u64,
    buffer: Mutex<HashMap<ActionType, i64>>,
}

impl BufferedUsageGuardrail {
    /// Build a guardrail for one organization.
    #[must_use]
    pub fn new(
        organization: Organization,
        store: std::sync::Arc<dyn UsageLedgerStore>,
        threshold: u64,
    ) -> Self {
        Self {
            organization,
            store,
            threshold,
            buffer: Mutex::new(HashMap::new()),
        }
    }

    fn buffered_delta(&self, action_type: ActionType) -> i64 {
        #[allow(clippy::unwrap_used)]
        self.buffer.lock().unwrap().get(&action_type).copied().unwrap_or(0)
    }

    fn add_delta(&self, action_type: ActionType, delta: i64) -> i64 {
        #[allow(clippy::unwrap_used)]
        let mut buffer = self.buffer.lock().unwrap();
        let entry = buffer.entry(action_type).or_insert(0);
        *entry += delta;
        *entry
    }

    fn drain_buffer(&self) -> Vec<(ActionType, i64)> {
        #[allow(clippy::unwrap_used)]
        let mut buffer = self.buffer.lock().unwrap();
        FLUSH_ORDER
            .iter()
            .filter_map(|action_type| buffer.remove(action_type).map(|delta| (*action_type, delta)))
            .filter(|(_, delta)| *delta != 0)
            .collect()
    }
}

#[async_trait]
impl UsageGuardrail for BufferedUsageGuardrail {
    async fn is_allowed(&self, action_type: ActionType, amount: u64) -> Result<(), CoreError> {
        let plan = self
            .organization
            .plan()
            .ok_or_else(|| CoreError::DataIntegrity {
                message: format!(
                    "organization {} has no resolved billing plan; usage guardrail cannot evaluate",
                    self.organization.id()
                ),
            })?;
        let Some(&limit) = plan.usage_limits.get(action_type.as_str()) else {
            return Ok(());
        };

        let ledger = self.store.current_counts(self.organization.id()).await?;
        let persisted = ledger.count(action_type);
        let buffered = self.buffered_delta(action_type);
        let projected = i64::try_from(persisted)
            .unwrap_or(i64::MAX)
            .saturating_add(buffered)
            .saturating_add(i64::try_from(amount).unwrap_or(i64::MAX));

        if projected > i64::try_from(limit).unwrap_or(i64::MAX) {
            return Err(CoreError::UsageLimitExceeded {
                action_type: action_type.as_str().to_string(),
            });
        }
        Ok(())
    }

    async fn increment(&self, action_type: ActionType, amount: u64) {
        let delta = self.add_delta(action_type, i64::try_from(amount).unwrap_or(i64::MAX));
        if delta.unsigned_abs() >= self.threshold {
            if let Err(err) = self.flush_all().await {
                tracing::error!(
                    organization_id = %self.organization.id(),
                    error = %err,
                    "threshold-triggered usage flush failed"
                );
            }
        }
    }

    async fn decrement(&self, action_type: ActionType, amount: u64) {
        let delta = self.add_delta(action_type, -i64::try_from(amount).unwrap_or(i64::MAX));
        if delta.unsigned_abs() >= self.threshold {
            if let Err(err) = self.flush_all().await {
                tracing::error!(
                    organization_id = %self.organization.id(),
                    error = %err,
                    "threshold-triggered usage flush failed"
                );
            }
        }
    }

    async fn flush_all(&self) -> Result<(), CoreError> {
        let deltas = self.drain_buffer();
        if deltas.is_empty() {
            return Ok(());
        }
        self.store.apply_deltas(self.organization.id(), &deltas).await
    }
}

/// Builds and caches exactly one [`UsageGuardrail`] per organization
/// within a process, matching the platform's factory-singleton usage
/// service.
pub struct UsageGuardrailFactory {
    store: std::sync::Arc<dyn UsageLedgerStore>,
    threshold: u64,
    instances: DashMap<Uuid, std::sync::Arc<BufferedUsageGuardrail>>,
}

impl UsageGuardrailFactory {
    /// Build a factory backed by a shared ledger store.
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn UsageLedgerStore>, threshold: u64) -> Self {
        Self {
            store,
            threshold,
            instances: DashMap::new(),
        }
    }

    /// Return the process-wide guardrail instance for `organization`,
    /// creating it on first use.
    #[must_use]
    pub fn create(&self, organization: Organization) -> std::sync::Arc<BufferedUsageGuardrail> {
        self.instances
            .entry(organization.id())
            .or_insert_with(|| {
                std::sync::Arc::new(BufferedUsageGuardrail::new(
                    organization,
                    self.store.clone(),
                    self.threshold,
                ))
            })
            .clone()
    }

    /// Flush every cached guardrail's buffer. Called on graceful shutdown
    /// so no buffered usage is lost.
    ///
    /// # Errors
    /// Returns the first flush error encountered; subsequent guardrails
    /// are still attempted.
    pub async fn flush_all(&self) -> Result<(), CoreError> {
        let mut first_error = None;
        for entry in self.instances.iter() {
            if let Err(err) = entry.value().flush_all().await {
                tracing::error!(error = %err, "guardrail flush failed during shutdown");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for UsageGuardrailFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageGuardrailFactory")
            .field("threshold", &self.threshold)
            .field("cached_instances", &self.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airweave_core::BillingPlan;
    use std::collections::HashMap as StdHashMap;

    fn org_with_limit(action: ActionType, limit: u64) -> Organization {
        let mut limits = StdHashMap::new();
        limits.insert(action.as_str().to_string(), limit);
        Organization::new(Uuid::new_v4(), "acme").with_plan(BillingPlan {
            rate_limit_quota: 100,
            rate_limit_window_secs: 60,
            usage_limits: limits,
        })
    }

    #[tokio::test]
    async fn increment_flushes_at_threshold_and_ledger_reflects_total() {
        let store = std::sync::Arc::new(InMemoryUsageLedgerStore::new());
        let org = org_with_limit(ActionType::Entities, 1000);
        let org_id = org.id();
        let guardrail = BufferedUsageGuardrail::new(org, store.clone(), 5);

        guardrail.increment(ActionType::Entities, 3).await;
        let ledger = store.current_counts(org_id).await.unwrap();
        assert_eq!(ledger.count(ActionType::Entities), 0, "below threshold, not yet flushed");

        guardrail.increment(ActionType::Entities, 3).await;
        let ledger = store.current_counts(org_id).await.unwrap();
        assert_eq!(ledger.count(ActionType::Entities), 6, "threshold crossed, auto-flushed");
    }

    #[tokio::test]
    async fn flush_all_persists_pending_buffer() {
        let store = std::sync::Arc::new(InMemoryUsageLedgerStore::new());
        let org = org_with_limit(ActionType::Entities, 1000);
        let org_id = org.id();
        let guardrail = BufferedUsageGuardrail::new(org, store.clone(), 1000);

        guardrail.increment(ActionType::Entities, 2).await;
        guardrail.increment(ActionType::Queries, 1).await;
        guardrail.flush_all().await.unwrap();

        let ledger = store.current_counts(org_id).await.unwrap();
        assert_eq!(ledger.count(ActionType::Entities), 2);
        assert_eq!(ledger.count(ActionType::Queries), 1);
    }

    #[tokio::test]
    async fn is_allowed_rejects_once_projected_total_exceeds_limit() {
        let store = std::sync::Arc::new(InMemoryUsageLedgerStore::new());
        let org = org_with_limit(ActionType::Entities, 5);
        let guardrail = BufferedUsageGuardrail::new(org, store, 1000);

        guardrail.increment(ActionType::Entities, 4).await;
        assert!(guardrail.is_allowed(ActionType::Entities, 1).await.is_ok());
        let err = guardrail.is_allowed(ActionType::Entities, 2).await.unwrap_err();
        assert!(matches!(err, CoreError::UsageLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn factory_returns_the_same_instance_per_organization() {
        let store = std::sync::Arc::new(InMemoryUsageLedgerStore::new());
        let factory = UsageGuardrailFactory::new(store, 10);
        let org = org_with_limit(ActionType::Entities, 100);
        let org_id = org.id();

        let first = factory.create(org.clone());
        let second = factory.create(org);
        assert!(std::sync::Arc::ptr_eq(&first, &second));
        let _ = org_id;
    }
}
