//! Composition root: constructs every library crate's concrete
//! collaborator exactly once at process startup and threads them
//! explicitly into each job run.
//!
//! Grounded on `original_source::domains/billing/context.py`'s
//! factory-created, per-org service pattern (here generalized to the
//! whole process rather than one domain), with no runtime
//! service-locator or reflection-based lookup (spec §9).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use airweave_cache::InMemoryContextCache;
use airweave_core::{Organization, RuntimeConfig};
use airweave_events::subscribers::{OrganizationLookup, ProgressSink, ProgressSnapshot, SyncBillingHandler, SyncProgressRelay, WebhookEventSubscriber};
use airweave_events::EventBus;
use airweave_ratelimit::RateLimiter;
use airweave_secrets::SecretsManager;
use airweave_usage::{InMemoryUsageLedgerStore, UsageGuardrailFactory};
use airweave_webhooks::{ReqwestWebhookPublisher, WebhookEndpointResolver};
use async_trait::async_trait;
use uuid::Uuid;

/// In-memory tenant directory backing both the context cache's cold path
/// and the event bus's billing/progress subscribers. A real deployment
/// resolves organizations from the tenant database; that system of
/// record is out of scope here (identity/tenant administration).
#[derive(Default)]
pub struct OrganizationDirectory {
    organizations: Mutex<HashMap<Uuid, Organization>>,
}

impl OrganizationDirectory {
    /// Build an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an organization's record.
    pub fn insert(&self, organization: Organization) {
        #[allow(clippy::unwrap_used)]
        self.organizations.lock().unwrap().insert(organization.id(), organization);
    }

    /// Look up an organization by id.
    #[must_use]
    pub fn get(&self, organization_id: Uuid) -> Option<Organization> {
        #[allow(clippy::unwrap_used)]
        self.organizations.lock().unwrap().get(&organization_id).cloned()
    }
}

#[async_trait]
impl OrganizationLookup for OrganizationDirectory {
    async fn get(&self, organization_id: Uuid) -> Option<Organization> {
        Self::get(self, organization_id)
    }
}

/// No outbound webhook endpoints are configured in this composition
/// root; a real deployment resolves these from tenant settings (billing
/// provider integration and tenant administration are both out of
/// scope).
struct NoWebhookEndpoints;

impl WebhookEndpointResolver for NoWebhookEndpoints {
    fn endpoint_for(&self, _organization_id: Uuid) -> Option<String> {
        None
    }
}

/// Republishes progress snapshots as structured log lines. A real
/// deployment fans these out to an org-scoped pub/sub channel; that
/// transport is out of scope here, so this sink is the observable
/// endpoint of the pipeline in this binary.
struct LoggingProgressSink;

#[async_trait]
impl ProgressSink for LoggingProgressSink {
    async fn publish(&self, snapshot: ProgressSnapshot) {
        tracing::info!(
            organization_id = %snapshot.organization_id,
            event_type = %snapshot.event_type,
            sync_id = ?snapshot.sync_id,
            job_id = ?snapshot.job_id,
            "progress snapshot"
        );
    }
}

/// Every library crate's concrete collaborator, constructed once and
/// shared across job runs for the lifetime of the process.
pub struct Container {
    /// Runtime tunables loaded at startup.
    pub config: RuntimeConfig,
    /// Tenant directory used by the cache's cold path and the bus's
    /// billing/progress subscribers.
    pub organizations: Arc<OrganizationDirectory>,
    /// Memoized organization/user/api-key lookups.
    pub context_cache: Arc<InMemoryContextCache>,
    /// Per-organization sliding-window admission control.
    pub rate_limiter: RateLimiter,
    /// Credential-at-rest encryption, keyed by a single process-wide key.
    pub secrets: SecretsManager,
    /// Process-wide event bus, pre-wired with the webhook, billing, and
    /// progress-relay subscribers.
    pub event_bus: Arc<EventBus>,
    /// Per-organization usage guardrail factory.
    pub guardrail_factory: Arc<UsageGuardrailFactory>,
}

impl Container {
    /// Construct the process-wide container: allocate every collaborator
    /// and subscribe the three required handlers to the event bus.
    ///
    /// # Errors
    /// Returns an error string if a subscriber's glob patterns fail to
    /// compile — this would indicate a typo in a pattern literal, never
    /// a runtime condition.
    pub async fn build(config: RuntimeConfig, credential_key: [u8; 32]) -> Result<Self, String> {
        let organizations = Arc::new(OrganizationDirectory::new());
        let context_cache = Arc::new(InMemoryContextCache::with_ttl(std::time::Duration::from_secs(
            config.context_cache_ttl_secs,
        )));
        let rate_limiter = RateLimiter::new();
        let secrets = SecretsManager::new(&credential_key);

        let usage_store = Arc::new(InMemoryUsageLedgerStore::new());
        let guardrail_factory = Arc::new(UsageGuardrailFactory::new(usage_store, config.usage_flush_threshold));

        let event_bus = Arc::new(EventBus::new());
        let webhook_publisher = Arc::new(ReqwestWebhookPublisher::new(Arc::new(NoWebhookEndpoints)));
        event_bus
            .subscribe(Arc::new(WebhookEventSubscriber::new(webhook_publisher)))
            .await?;
        event_bus
            .subscribe(Arc::new(SyncBillingHandler::new(
                guardrail_factory.clone(),
                organizations.clone(),
            )))
            .await?;
        event_bus
            .subscribe(Arc::new(SyncProgressRelay::new(Arc::new(LoggingProgressSink))))
            .await?;

        Ok(Self {
            config,
            organizations,
            context_cache,
            rate_limiter,
            secrets,
            event_bus,
            guardrail_factory,
        })
    }
}
