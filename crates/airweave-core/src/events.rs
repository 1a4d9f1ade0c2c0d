//! Domain events: the immutable records published on the event bus.
//!
//! Every event carries three required fields (`event_type`, `timestamp`,
//! `organization_id`) and serializes bit-exact on the wire as a flat JSON
//! object — `event_type` drives webhook channel routing and subscribers
//! must receive the payload unchanged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Common behavior every published event implements. `Serialize` plus
/// these three accessors let the event bus route by `event_type()`
/// without downcasting, and let a webhook subscriber forward the payload
/// without knowing the concrete event type.
pub trait DomainEvent: Serialize {
    /// Namespaced event type, e.g. `"sync.started"`.
    fn event_type(&self) -> &str;

    /// UTC timestamp this event was produced.
    fn timestamp(&self) -> DateTime<Utc>;

    /// The organization this event is scoped to.
    fn organization_id(&self) -> Uuid;

    /// The full wire payload, unchanged from what a webhook subscriber
    /// forwards. Default implementation serializes `self` directly since
    /// every concrete event type carries its base fields as plain struct
    /// fields (no wrapper envelope).
    fn to_webhook_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `organization.*` family: membership and lifecycle changes.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationLifecycleEvent {
    event_type: String,
    timestamp: DateTime<Utc>,
    organization_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<Uuid>,
}

impl OrganizationLifecycleEvent {
    fn new(verb: &str, organization_id: Uuid, user_id: Option<Uuid>) -> Self {
        Self {
            event_type: format!("organization.{verb}"),
            timestamp: Utc::now(),
            organization_id,
            user_id,
        }
    }

    /// `organization.created`.
    #[must_use]
    pub fn created(organization_id: Uuid) -> Self {
        Self::new("created", organization_id, None)
    }

    /// `organization.deleted`.
    #[must_use]
    pub fn deleted(organization_id: Uuid) -> Self {
        Self::new("deleted", organization_id, None)
    }

    /// `organization.member_added`.
    #[must_use]
    pub fn member_added(organization_id: Uuid, user_id: Uuid) -> Self {
        Self::new("member_added", organization_id, Some(user_id))
    }

    /// `organization.member_removed`.
    #[must_use]
    pub fn member_removed(organization_id: Uuid, user_id: Uuid) -> Self {
        Self::new("member_removed", organization_id, Some(user_id))
    }
}

impl DomainEvent for OrganizationLifecycleEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}

/// `collection.*` family.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionLifecycleEvent {
    event_type: String,
    timestamp: DateTime<Utc>,
    organization_id: Uuid,
    collection_id: Uuid,
}

impl CollectionLifecycleEvent {
    fn new(verb: &str, organization_id: Uuid, collection_id: Uuid) -> Self {
        Self {
            event_type: format!("collection.{verb}"),
            timestamp: Utc::now(),
            organization_id,
            collection_id,
        }
    }

    /// `collection.created`.
    #[must_use]
    pub fn created(organization_id: Uuid, collection_id: Uuid) -> Self {
        Self::new("created", organization_id, collection_id)
    }

    /// `collection.deleted`.
    #[must_use]
    pub fn deleted(organization_id: Uuid, collection_id: Uuid) -> Self {
        Self::new("deleted", organization_id, collection_id)
    }
}

impl DomainEvent for CollectionLifecycleEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}

/// `source_connection.*` family.
#[derive(Debug, Clone, Serialize)]
pub struct SourceConnectionLifecycleEvent {
    event_type: String,
    timestamp: DateTime<Utc>,
    organization_id: Uuid,
    source_connection_id: Uuid,
}

impl SourceConnectionLifecycleEvent {
    fn new(verb: &str, organization_id: Uuid, source_connection_id: Uuid) -> Self {
        Self {
            event_type: format!("source_connection.{verb}"),
            timestamp: Utc::now(),
            organization_id,
            source_connection_id,
        }
    }

    /// `source_connection.created`.
    #[must_use]
    pub fn created(organization_id: Uuid, source_connection_id: Uuid) -> Self {
        Self::new("created", organization_id, source_connection_id)
    }

    /// `source_connection.deleted`.
    #[must_use]
    pub fn deleted(organization_id: Uuid, source_connection_id: Uuid) -> Self {
        Self::new("deleted", organization_id, source_connection_id)
    }
}

impl DomainEvent for SourceConnectionLifecycleEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}

/// `sync.*` family: orchestrator lifecycle events.
#[derive(Debug, Clone, Serialize)]
pub struct SyncLifecycleEvent {
    event_type: String,
    timestamp: DateTime<Utc>,
    organization_id: Uuid,
    sync_id: Uuid,
    job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl SyncLifecycleEvent {
    fn new(
        verb: &str,
        organization_id: Uuid,
        sync_id: Uuid,
        job_id: Uuid,
        error_kind: Option<String>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            event_type: format!("sync.{verb}"),
            timestamp: Utc::now(),
            organization_id,
            sync_id,
            job_id,
            error_kind,
            error_message,
        }
    }

    /// `sync.started`, published before the first batch is fetched.
    #[must_use]
    pub fn started(organization_id: Uuid, sync_id: Uuid, job_id: Uuid) -> Self {
        Self::new("started", organization_id, sync_id, job_id, None, None)
    }

    /// `sync.completed`, published after the last batch and orphan
    /// detection finish successfully.
    #[must_use]
    pub fn completed(organization_id: Uuid, sync_id: Uuid, job_id: Uuid) -> Self {
        Self::new("completed", organization_id, sync_id, job_id, None, None)
    }

    /// `sync.failed`, carrying the error kind and message that aborted
    /// the run.
    #[must_use]
    pub fn failed(
        organization_id: Uuid,
        sync_id: Uuid,
        job_id: Uuid,
        error_kind: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self::new(
            "failed",
            organization_id,
            sync_id,
            job_id,
            Some(error_kind.into()),
            Some(error_message.into()),
        )
    }

    /// `sync.cancelled`, published exactly once after a cancellation
    /// signal drains in-flight work.
    #[must_use]
    pub fn cancelled(organization_id: Uuid, sync_id: Uuid, job_id: Uuid) -> Self {
        Self::new("cancelled", organization_id, sync_id, job_id, None, None)
    }
}

impl DomainEvent for SyncLifecycleEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}

/// `entity.batch_processed`: one per batch applied by the dispatcher.
/// Drives the billing handler and the progress relay.
#[derive(Debug, Clone, Serialize)]
pub struct EntityBatchProcessedEvent {
    event_type: String,
    timestamp: DateTime<Utc>,
    organization_id: Uuid,
    sync_id: Uuid,
    job_id: Uuid,
    inserted: u64,
    updated: u64,
    deleted: u64,
    kept: u64,
    skipped: u64,
    billable: bool,
}

impl EntityBatchProcessedEvent {
    /// Build the event for one completed batch.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        organization_id: Uuid,
        sync_id: Uuid,
        job_id: Uuid,
        inserted: u64,
        updated: u64,
        deleted: u64,
        kept: u64,
        skipped: u64,
        billable: bool,
    ) -> Self {
        Self {
            event_type: "entity.batch_processed".to_string(),
            timestamp: Utc::now(),
            organization_id,
            sync_id,
            job_id,
            inserted,
            updated,
            deleted,
            kept,
            skipped,
            billable,
        }
    }

    /// Entities inserted in this batch.
    #[must_use]
    pub const fn inserted(&self) -> u64 {
        self.inserted
    }

    /// Entities updated in this batch.
    #[must_use]
    pub const fn updated(&self) -> u64 {
        self.updated
    }

    /// Entities deleted in this batch.
    #[must_use]
    pub const fn deleted(&self) -> u64 {
        self.deleted
    }

    /// Whether this batch's counts should be metered against the
    /// organization's usage ledger.
    #[must_use]
    pub const fn billable(&self) -> bool {
        self.billable
    }
}

impl DomainEvent for EntityBatchProcessedEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}
