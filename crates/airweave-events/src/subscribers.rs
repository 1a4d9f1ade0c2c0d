//! The event bus's three required subscribers.
//!
//! Grounded on `original_source::domains/webhooks/subscribers.py::
//! WebhookEventSubscriber` (`EVENT_PATTERNS = ["*"]`, forwards
//! `event.to_webhook_payload()` unchanged) and
//! `platform/sync/subscribers/billing_handler.py::SyncBillingHandler`
//! (`EVENT_PATTERNS = ["entity.*"]`, skips non-billable events, increments
//! by `inserted + updated`, swallows its own errors). The progress relay's
//! sibling file was not present in the retrieval pack; its shape is
//! reconstructed from this specification's §4.3 description.

use std::sync::Arc;

use airweave_core::{ActionType, Organization};
use airweave_usage::{UsageGuardrail, UsageGuardrailFactory};
use airweave_webhooks::WebhookPublisher;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{PublishedEvent, Subscriber};

/// Narrow boundary the billing and progress subscribers use to resolve an
/// organization from the id carried on every event. Administration of the
/// organization system of record is out of scope for this crate.
#[async_trait]
pub trait OrganizationLookup: Send + Sync {
    /// Resolve an organization by id, or `None` if it no longer exists.
    async fn get(&self, organization_id: Uuid) -> Option<Organization>;
}

/// Forwards every event's webhook payload to the external webhook
/// publisher, unchanged, using `event_type` as the channel.
pub struct WebhookEventSubscriber {
    publisher: Arc<dyn WebhookPublisher>,
}

impl WebhookEventSubscriber {
    /// Build a subscriber delivering through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn WebhookPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl Subscriber for WebhookEventSubscriber {
    fn name(&self) -> &str {
        "webhook"
    }

    fn patterns(&self) -> &[&str] {
        &["*"]
    }

    async fn handle(&self, event: &PublishedEvent) -> Result<(), String> {
        self.publisher
            .publish(event.organization_id, &event.event_type, &event.payload)
            .await
            .map_err(|err| err.to_string())
    }
}

/// Listens on `entity.*`, ignores non-billable batches, and increments the
/// organization's entity usage counter by `inserted + updated`.
pub struct SyncBillingHandler {
    factory: Arc<UsageGuardrailFactory>,
    organizations: Arc<dyn OrganizationLookup>,
}

impl SyncBillingHandler {
    /// Build a billing handler backed by a guardrail factory and an
    /// organization lookup.
    #[must_use]
    pub fn new(factory: Arc<UsageGuardrailFactory>, organizations: Arc<dyn OrganizationLookup>) -> Self {
        Self {
            factory,
            organizations,
        }
    }
}

#[async_trait]
impl Subscriber for SyncBillingHandler {
    fn name(&self) -> &str {
        "billing"
    }

    fn patterns(&self) -> &[&str] {
        &["entity.*"]
    }

    async fn handle(&self, event: &PublishedEvent) -> Result<(), String> {
        let billable = event
            .payload
            .get("billable")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if !billable {
            return Ok(());
        }

        let inserted = event.payload.get("inserted").and_then(Value::as_u64).unwrap_or(0);
        let updated = event.payload.get("updated").and_then(Value::as_u64).unwrap_or(0);
        let amount = inserted + updated;
        if amount == 0 {
            return Ok(());
        }

        let organization = self
            .organizations
            .get(event.organization_id)
            .await
            .ok_or_else(|| format!("organization {} not found", event.organization_id))?;

        let guardrail = self.factory.create(organization);
        guardrail.increment(ActionType::Entities, amount).await;
        Ok(())
    }
}

/// A compact progress snapshot republished on an org-scoped channel for
/// every `sync.*`/`entity.*` event observed.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// The organization this snapshot belongs to.
    pub organization_id: Uuid,
    /// The source event's type, unchanged, so a dashboard can distinguish
    /// a lifecycle transition from a batch update.
    pub event_type: String,
    /// The sync this snapshot concerns, if the source event carried one.
    pub sync_id: Option<Uuid>,
    /// The job this snapshot concerns, if the source event carried one.
    pub job_id: Option<Uuid>,
    /// The full source payload, passed through for clients that want
    /// batch counts without a second round trip.
    pub payload: Value,
}

/// Destination for republished progress snapshots — an org-scoped
/// pub/sub channel in a full deployment; a test double in this crate's
/// own tests.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Publish a snapshot on the organization's progress channel.
    async fn publish(&self, snapshot: ProgressSnapshot);
}

/// Listens on `sync.*` and `entity.*`, republishing a compact progress
/// snapshot for each.
pub struct SyncProgressRelay {
    sink: Arc<dyn ProgressSink>,
}

impl SyncProgressRelay {
    /// Build a relay publishing through `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Subscriber for SyncProgressRelay {
    fn name(&self) -> &str {
        "progress-relay"
    }

    fn patterns(&self) -> &[&str] {
        &["sync.*", "entity.*"]
    }

    async fn handle(&self, event: &PublishedEvent) -> Result<(), String> {
        let sync_id = event
            .payload
            .get("sync_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let job_id = event
            .payload
            .get("job_id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());

        self.sink
            .publish(ProgressSnapshot {
                organization_id: event.organization_id,
                event_type: event.event_type.clone(),
                sync_id,
                job_id,
                payload: event.payload.clone(),
            })
            .await;
        Ok(())
    }
}
