//! Syncs: the schedulable unit, its destination slots, and its job
//! history's state machine.

use airweave_error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of the `Sync` record itself (distinct from any single
/// `SyncJob`'s status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Eligible for scheduled or manual runs.
    Active,
    /// Paused; no runs scheduled.
    Inactive,
    /// Soft-deleted.
    Deleted,
}

/// The role a destination slot plays within a sync's fan-out set.
///
/// Exactly one slot may hold `Active` at a time — enforced by
/// [`Sync::set_destination_role`], never by construction alone, since a
/// sync accumulates slots over its lifetime via `add_destination_slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationRole {
    /// Receives writes; the only role reads are served from.
    Active,
    /// Receives writes, not read from. Used during destination migrations.
    Shadow,
    /// No longer receives writes; retained for audit/rollback.
    Deprecated,
}

/// A slot bound to a sync: either the source slot (`role = None`) or one
/// of possibly many destination slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConnection {
    connection_id: Uuid,
    connection_name: String,
    role: Option<DestinationRole>,
    created_at: DateTime<Utc>,
}

impl SyncConnection {
    /// Build the sync's source slot (no destination role).
    #[must_use]
    pub fn source(connection_id: Uuid, connection_name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            connection_id,
            connection_name: connection_name.into(),
            role: None,
            created_at,
        }
    }

    /// Build a destination slot with the given role.
    #[must_use]
    pub fn destination(
        connection_id: Uuid,
        connection_name: impl Into<String>,
        role: DestinationRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id,
            connection_name: connection_name.into(),
            role: Some(role),
            created_at,
        }
    }

    /// The bound connection's id.
    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Display name of the bound connection.
    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// `None` for the source slot; `Some(role)` for destination slots.
    #[must_use]
    pub const fn role(&self) -> Option<DestinationRole> {
        self.role
    }

    /// When this slot was added to the sync.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Behavior flags and destination filtering carried on a `SyncJob`'s
/// execution config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Skip content-hash comparison; every non-deletion entity becomes
    /// insert-or-update by presence alone. Used for ARF replay runs.
    #[serde(default)]
    pub skip_hash_comparison: bool,
    /// Skip emitting Update actions entirely (only Insert/Delete/Keep).
    #[serde(default)]
    pub skip_updates: bool,
    /// Handler names to exclude from dispatch for this job, in addition to
    /// any per-batch `skip_content_handlers` the resolver produces.
    #[serde(default)]
    pub disabled_handlers: Vec<String>,
    /// Whether this run's `entity.batch_processed` events are billable.
    /// Defaults to true; replay runs set this false.
    #[serde(default = "default_true")]
    pub meter_entities: bool,
    /// Destination connection ids to restrict writes to, if non-empty.
    #[serde(default)]
    pub destination_filter: Vec<Uuid>,
}

const fn default_true() -> bool {
    true
}

impl ExecutionConfig {
    /// The default execution config: full hash comparison, all handlers,
    /// metered, all destinations.
    #[must_use]
    pub fn metered() -> Self {
        Self {
            meter_entities: true,
            ..Self::default()
        }
    }

    /// An execution config appropriate for an ARF replay run: skips hash
    /// comparison (content from ARF is authoritative) and is not billed.
    #[must_use]
    pub fn replay() -> Self {
        Self {
            skip_hash_comparison: true,
            meter_entities: false,
            ..Self::default()
        }
    }
}

/// The monotone state machine a `SyncJob` moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    /// Job record created, not yet queued.
    Created,
    /// Queued, waiting for a worker slot.
    Pending,
    /// Actively executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an unrecoverable error.
    Failed,
    /// Cancellation requested; draining in-flight work.
    Cancelling,
    /// Cancellation completed.
    Cancelled,
}

impl SyncJobStatus {
    /// Whether `self -> next` is one of the transitions drawn in the state
    /// diagram. The only legal moves are:
    /// `created -> pending -> running -> {completed, failed}`,
    /// `running -> cancelling -> cancelled`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Pending)
                | (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelling)
                | (Self::Cancelling, Self::Cancelled)
        )
    }

    /// The exact wire string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One execution of a `Sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    id: Uuid,
    sync_id: Uuid,
    organization_id: Uuid,
    status: SyncJobStatus,
    execution_config: ExecutionConfig,
    created_at: DateTime<Utc>,
    error_message: Option<String>,
}

impl SyncJob {
    /// Build a freshly created job in the `Created` state.
    #[must_use]
    pub fn new(
        id: Uuid,
        sync_id: Uuid,
        organization_id: Uuid,
        execution_config: ExecutionConfig,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sync_id,
            organization_id,
            status: SyncJobStatus::Created,
            execution_config,
            created_at,
            error_message: None,
        }
    }

    /// This job's id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The sync this job executes.
    #[must_use]
    pub const fn sync_id(&self) -> Uuid {
        self.sync_id
    }

    /// Owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// Current state-machine position.
    #[must_use]
    pub const fn status(&self) -> SyncJobStatus {
        self.status
    }

    /// The execution config this job was triggered with.
    #[must_use]
    pub const fn execution_config(&self) -> &ExecutionConfig {
        &self.execution_config
    }

    /// The failure message recorded if this job transitioned to `Failed`.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Attempt a state transition, rejecting anything not drawn in the
    /// state diagram with a data-integrity error — the orchestrator is the
    /// only caller and a disallowed transition indicates a bug in it, not
    /// a caller mistake.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidState`] if `next` is not reachable from
    /// the job's current status.
    pub fn transition_to(&mut self, next: SyncJobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidState {
                message: format!(
                    "sync job {} cannot move from {:?} to {:?}",
                    self.id, self.status, next
                ),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Transition to `Failed`, recording the error message in the same
    /// step so the two never drift apart.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidState`] if the job is not `Running`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition_to(SyncJobStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }
}

/// The schedulable unit: one source slot, zero or more destination slots,
/// an opaque cursor, and a job history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sync {
    id: Uuid,
    organization_id: Uuid,
    collection_id: Uuid,
    source_slot: SyncConnection,
    destination_slots: Vec<SyncConnection>,
    status: SyncStatus,
    collection_dedup_enabled: bool,
}

impl Sync {
    /// Build a sync with just its source slot bound.
    #[must_use]
    pub fn new(
        id: Uuid,
        organization_id: Uuid,
        collection_id: Uuid,
        source_slot: SyncConnection,
    ) -> Self {
        Self {
            id,
            organization_id,
            collection_id,
            source_slot,
            destination_slots: Vec::new(),
            status: SyncStatus::Active,
            collection_dedup_enabled: false,
        }
    }

    /// This sync's id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// The collection this sync feeds.
    #[must_use]
    pub const fn collection_id(&self) -> Uuid {
        self.collection_id
    }

    /// The sync's single source slot.
    #[must_use]
    pub const fn source_slot(&self) -> &SyncConnection {
        &self.source_slot
    }

    /// All destination slots, in the order they were added.
    #[must_use]
    pub fn destination_slots(&self) -> &[SyncConnection] {
        &self.destination_slots
    }

    /// Destination slots currently eligible for writes (active + shadow).
    #[must_use]
    pub fn writable_destinations(&self) -> impl Iterator<Item = &SyncConnection> {
        self.destination_slots
            .iter()
            .filter(|c| matches!(c.role(), Some(DestinationRole::Active | DestinationRole::Shadow)))
    }

    /// The single active destination slot, if one exists.
    #[must_use]
    pub fn active_destination(&self) -> Option<&SyncConnection> {
        self.destination_slots
            .iter()
            .find(|c| c.role() == Some(DestinationRole::Active))
    }

    /// Whether collection-level dedup is enabled for this sync.
    #[must_use]
    pub const fn collection_dedup_enabled(&self) -> bool {
        self.collection_dedup_enabled
    }

    /// Enable or disable collection-level dedup.
    pub fn set_collection_dedup_enabled(&mut self, enabled: bool) {
        self.collection_dedup_enabled = enabled;
    }

    /// Add a destination slot.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidState`] if adding an `Active` slot would
    /// leave more than one active slot on this sync.
    pub fn add_destination_slot(&mut self, slot: SyncConnection) -> Result<(), CoreError> {
        if slot.role() == Some(DestinationRole::Active) && self.active_destination().is_some() {
            return Err(CoreError::InvalidState {
                message: format!("sync {} already has an active destination slot", self.id),
            });
        }
        self.destination_slots.push(slot);
        Ok(())
    }

    /// Change a destination slot's role, enforcing the at-most-one-active
    /// invariant. Used by fork-destination's promote/demote step.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] if no slot matches `connection_id`,
    /// or [`CoreError::InvalidState`] if the change would create a second
    /// active slot.
    pub fn set_destination_role(
        &mut self,
        connection_id: Uuid,
        role: DestinationRole,
    ) -> Result<(), CoreError> {
        if role == DestinationRole::Active {
            if let Some(current) = self.active_destination() {
                if current.connection_id() != connection_id {
                    return Err(CoreError::InvalidState {
                        message: format!(
                            "sync {} already has connection {} active",
                            self.id,
                            current.connection_id()
                        ),
                    });
                }
            }
        }
        let slot = self
            .destination_slots
            .iter_mut()
            .find(|c| c.connection_id() == connection_id)
            .ok_or_else(|| CoreError::NotFound {
                resource: format!("destination slot {connection_id} on sync {}", self.id),
            })?;
        slot.role = Some(role);
        Ok(())
    }

    /// Atomically promote one slot to active and demote the prior active
    /// slot to deprecated. Used to complete a fork-destination replay.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] if `promote_id` is not a slot on
    /// this sync.
    pub fn promote_destination(&mut self, promote_id: Uuid) -> Result<(), CoreError> {
        let prior_active = self.active_destination().map(SyncConnection::connection_id);
        if !self
            .destination_slots
            .iter()
            .any(|c| c.connection_id() == promote_id)
        {
            return Err(CoreError::NotFound {
                resource: format!("destination slot {promote_id} on sync {}", self.id),
            });
        }
        if let Some(prior_id) = prior_active {
            if prior_id != promote_id {
                self.set_destination_role_unchecked(prior_id, DestinationRole::Deprecated);
            }
        }
        self.set_destination_role_unchecked(promote_id, DestinationRole::Active);
        Ok(())
    }

    fn set_destination_role_unchecked(&mut self, connection_id: Uuid, role: DestinationRole) {
        if let Some(slot) = self
            .destination_slots
            .iter_mut()
            .find(|c| c.connection_id() == connection_id)
        {
            slot.role = Some(role);
        }
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        self.status
    }

    /// Update the lifecycle status.
    pub fn set_status(&mut self, status: SyncStatus) {
        self.status = status;
    }
}
