//! Drives one sync job end to end: resolve, dispatch, track, and
//! publish lifecycle events, honoring cancellation at batch boundaries.

use std::sync::Arc;

use airweave_core::events::SyncLifecycleEvent;
use airweave_core::{ActionType, DestinationRole, Sync, SyncJob, SyncJobStatus};
use airweave_error::CoreError;
use airweave_events::EventBus;
use airweave_usage::UsageGuardrail;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::cursor::SyncCursor;
use crate::dispatcher::{ActionDispatcher, DisabledHandlers};
use crate::handlers::{ArfHandler, ArfStore, DestinationClient, DestinationHandler, EntityPostgresHandler};
use crate::resolver::{EntityActionResolver, EntityRecordStore, ResolverConfig};
use crate::source::Source;
use crate::tracker::{BatchCounts, EntityTracker};

enum DriveOutcome {
    Exhausted,
    Cancelled,
}

/// Everything the orchestrator needs beyond the job/sync/source it is
/// invoked with. Resolving these (loading the sync, its destinations,
/// decrypting credentials) is a composition-root concern, out of scope
/// for this crate.
pub struct SyncOrchestrator<'a> {
    record_store: &'a dyn EntityRecordStore,
    arf_store: Arc<dyn ArfStore>,
    destinations: Vec<(DestinationRole, Arc<dyn DestinationClient>)>,
    event_bus: &'a EventBus,
    guardrail: Arc<dyn UsageGuardrail>,
}

impl<'a> SyncOrchestrator<'a> {
    /// Build an orchestrator over one job's worth of destination and
    /// persistence dependencies.
    #[must_use]
    pub fn new(
        record_store: &'a dyn EntityRecordStore,
        arf_store: Arc<dyn ArfStore>,
        destinations: Vec<(DestinationRole, Arc<dyn DestinationClient>)>,
        event_bus: &'a EventBus,
        guardrail: Arc<dyn UsageGuardrail>,
    ) -> Self {
        Self {
            record_store,
            arf_store,
            destinations,
            event_bus,
            guardrail,
        }
    }

    /// Run `job` against `sync`, pulling batches from `source` starting
    /// at `cursor`, until the source is exhausted, a `CoreError` occurs,
    /// or `cancellation` is observed at a batch boundary.
    ///
    /// # Errors
    /// Returns the triggering error after transitioning `job` to
    /// `Failed` and publishing `sync.failed`.
    pub async fn run(
        &self,
        job: &mut SyncJob,
        sync: &Sync,
        source_connection_id: Uuid,
        mut source: Box<dyn Source>,
        mut cursor: Option<SyncCursor>,
        cancellation: CancellationToken,
    ) -> Result<(), CoreError> {
        if job.status() == SyncJobStatus::Created {
            job.transition_to(SyncJobStatus::Pending)?;
        }
        job.transition_to(SyncJobStatus::Running)?;
        self.event_bus
            .publish(&SyncLifecycleEvent::started(job.organization_id(), job.sync_id(), job.id()))
            .await;

        let resolver_config = ResolverConfig {
            sync_id: job.sync_id(),
            job_id: job.id(),
            organization_id: job.organization_id(),
            collection_id: sync.collection_id(),
            source_connection_id,
            collection_dedup_enabled: sync.collection_dedup_enabled(),
            skip_hash_comparison: job.execution_config().skip_hash_comparison,
            skip_updates: job.execution_config().skip_updates,
        };
        let resolver = EntityActionResolver::new(self.record_store, resolver_config);
        let destination_handler = DestinationHandler::new(self.destinations.clone());
        let arf_handler = ArfHandler::new(job.sync_id(), self.arf_store.clone());
        let entity_postgres_handler = EntityPostgresHandler::new(
            self.record_store,
            job.sync_id(),
            job.id(),
            job.organization_id(),
            sync.collection_id(),
            source_connection_id,
            sync.collection_dedup_enabled(),
        );
        let disabled = DisabledHandlers(job.execution_config().disabled_handlers.iter().cloned().collect());
        let dispatcher = ActionDispatcher::new(&destination_handler, &arf_handler, &entity_postgres_handler, &disabled);

        let meter_entities = job.execution_config().meter_entities;
        let mut tracker = EntityTracker::new();
        let full_sync = source.is_full_sync();

        let outcome = self
            .drive(job, &resolver, &dispatcher, source.as_mut(), &mut cursor, &cancellation, &mut tracker, meter_entities)
            .await;

        match outcome {
            Ok(DriveOutcome::Exhausted) => {
                if full_sync {
                    let orphans = resolver.resolve_orphans().await?;
                    if !orphans.actions.is_empty() {
                        let counts = dispatcher.dispatch(&orphans).await?;
                        tracker.record_batch(&orphans);
                        self.publish_batch_event(job, &counts, false).await;
                    }
                }
                self.guardrail.flush_all().await?;
                job.transition_to(SyncJobStatus::Completed)?;
                self.event_bus
                    .publish(&SyncLifecycleEvent::completed(job.organization_id(), job.sync_id(), job.id()))
                    .await;
                Ok(())
            }
            Ok(DriveOutcome::Cancelled) => {
                job.transition_to(SyncJobStatus::Cancelling)?;
                self.guardrail.flush_all().await?;
                job.transition_to(SyncJobStatus::Cancelled)?;
                self.event_bus
                    .publish(&SyncLifecycleEvent::cancelled(job.organization_id(), job.sync_id(), job.id()))
                    .await;
                Ok(())
            }
            Err(err) => {
                if let Err(flush_err) = self.guardrail.flush_all().await {
                    tracing::warn!(error = %flush_err, "usage flush failed while handling job failure");
                }
                let error_kind = err.error_code().to_string();
                let error_message = err.to_string();
                job.fail(error_message.clone())?;
                self.event_bus
                    .publish(&SyncLifecycleEvent::failed(
                        job.organization_id(),
                        job.sync_id(),
                        job.id(),
                        error_kind,
                        error_message,
                    ))
                    .await;
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        job: &SyncJob,
        resolver: &EntityActionResolver<'_>,
        dispatcher: &ActionDispatcher<'_>,
        source: &mut dyn Source,
        cursor: &mut Option<SyncCursor>,
        cancellation: &CancellationToken,
        tracker: &mut EntityTracker,
        meter_entities: bool,
    ) -> Result<DriveOutcome, CoreError> {
        loop {
            if cancellation.is_cancelled() {
                return Ok(DriveOutcome::Cancelled);
            }

            let (raw, next_cursor, done) = source.next_batch(cursor.as_ref()).await?;

            if !raw.is_empty() {
                let resolved = resolver.resolve(raw).await?;
                let counts = dispatcher.dispatch(&resolved).await?;
                tracker.record_batch(&resolved);

                if meter_entities {
                    let admitted = counts.inserted + counts.updated;
                    if admitted > 0 {
                        self.guardrail.increment(ActionType::Entities, admitted).await;
                    }
                    if counts.deleted > 0 {
                        self.guardrail.decrement(ActionType::Entities, counts.deleted).await;
                    }
                }
                self.publish_batch_event(job, &counts, meter_entities).await;
            }

            // Commit the cursor unconditionally: this batch's writes
            // already landed, so the source boundary must not re-deliver
            // it even if a later batch in this run fails.
            *cursor = next_cursor;

            if done {
                return Ok(DriveOutcome::Exhausted);
            }
        }
    }

    async fn publish_batch_event(&self, job: &SyncJob, counts: &BatchCounts, billable: bool) {
        let event = airweave_core::events::EntityBatchProcessedEvent::new(
            job.organization_id(),
            job.sync_id(),
            job.id(),
            counts.inserted,
            counts.updated,
            counts.deleted,
            counts.kept,
            0,
            billable,
        );
        self.event_bus.publish(&event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawEntity;
    use crate::testing::{FakeDestinationClient, InMemoryArfStore, InMemoryEntityRecordStore};
    use airweave_core::{
        Entity, EntityShape, ExecutionConfig, ProcessingRequirement, SyncConnection, SystemMetadata,
    };
    use airweave_usage::{BufferedUsageGuardrail, InMemoryUsageLedgerStore};
    use async_trait::async_trait;
    use chrono::Utc;

    fn entity(id: &str, hash: &str, sync_id: Uuid, collection_id: Uuid) -> Entity {
        Entity::new(
            id,
            "def",
            hash,
            EntityShape::Chunk { text: "hi".to_string() },
            Utc::now(),
            SystemMetadata {
                sync_id,
                collection_id,
                shape_tag: "chunk",
                deleted: false,
            },
        )
    }

    struct FixedBatchSource {
        batches: Vec<Vec<RawEntity>>,
        index: usize,
        full_sync: bool,
    }

    #[async_trait]
    impl Source for FixedBatchSource {
        async fn next_batch(
            &mut self,
            _cursor: Option<&SyncCursor>,
        ) -> Result<(Vec<RawEntity>, Option<SyncCursor>, bool), CoreError> {
            let batch = self.batches.get(self.index).cloned().unwrap_or_default();
            self.index += 1;
            let done = self.index >= self.batches.len();
            let cursor = SyncCursor::encode(&serde_json::json!({ "offset": self.index }));
            Ok((batch, Some(cursor), done))
        }

        fn is_full_sync(&self) -> bool {
            self.full_sync
        }
    }

    fn org_with_no_limits() -> airweave_core::Organization {
        airweave_core::Organization::new(Uuid::new_v4(), "acme").with_plan(airweave_core::BillingPlan {
            rate_limit_quota: 100,
            rate_limit_window_secs: 60,
            usage_limits: std::collections::HashMap::new(),
        })
    }

    #[tokio::test]
    async fn full_run_completes_and_tracks_inserts() {
        let sync_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let source_connection_id = Uuid::new_v4();

        let record_store = InMemoryEntityRecordStore::new();
        let arf_store = Arc::new(InMemoryArfStore::new());
        let active = Arc::new(FakeDestinationClient::new(ProcessingRequirement::Raw));
        let bus = EventBus::new();
        let usage_store = Arc::new(InMemoryUsageLedgerStore::new());
        let guardrail = Arc::new(BufferedUsageGuardrail::new(org_with_no_limits(), usage_store, 1000));

        let orchestrator = SyncOrchestrator::new(
            &record_store,
            arf_store,
            vec![(DestinationRole::Active, active.clone())],
            &bus,
            guardrail,
        );

        let mut job = SyncJob::new(
            Uuid::new_v4(),
            sync_id,
            organization_id,
            ExecutionConfig::metered(),
            Utc::now(),
        );
        let sync = Sync::new(
            sync_id,
            organization_id,
            collection_id,
            SyncConnection::source(source_connection_id, "source", Utc::now()),
        );

        let source = Box::new(FixedBatchSource {
            batches: vec![vec![RawEntity::Content(entity("e1", "h1", sync_id, collection_id))]],
            index: 0,
            full_sync: false,
        });

        orchestrator
            .run(&mut job, &sync, source_connection_id, source, None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.status(), SyncJobStatus::Completed);
        assert_eq!(active.written_ids(), vec!["e1".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_next_batch_boundary() {
        let sync_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let source_connection_id = Uuid::new_v4();

        let record_store = InMemoryEntityRecordStore::new();
        let arf_store = Arc::new(InMemoryArfStore::new());
        let active = Arc::new(FakeDestinationClient::new(ProcessingRequirement::Raw));
        let bus = EventBus::new();
        let usage_store = Arc::new(InMemoryUsageLedgerStore::new());
        let guardrail = Arc::new(BufferedUsageGuardrail::new(org_with_no_limits(), usage_store, 1000));

        let orchestrator = SyncOrchestrator::new(
            &record_store,
            arf_store,
            vec![(DestinationRole::Active, active)],
            &bus,
            guardrail,
        );

        let mut job = SyncJob::new(
            Uuid::new_v4(),
            sync_id,
            organization_id,
            ExecutionConfig::metered(),
            Utc::now(),
        );
        let sync = Sync::new(
            sync_id,
            organization_id,
            collection_id,
            SyncConnection::source(source_connection_id, "source", Utc::now()),
        );

        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let source = Box::new(FixedBatchSource {
            batches: vec![vec![RawEntity::Content(entity("e1", "h1", sync_id, collection_id))]],
            index: 0,
            full_sync: false,
        });

        orchestrator
            .run(&mut job, &sync, source_connection_id, source, None, cancellation)
            .await
            .unwrap();

        assert_eq!(job.status(), SyncJobStatus::Cancelled);
    }

    #[tokio::test]
    async fn destination_failure_fails_the_job() {
        let sync_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let source_connection_id = Uuid::new_v4();

        let record_store = InMemoryEntityRecordStore::new();
        let arf_store = Arc::new(InMemoryArfStore::new());
        let failing = Arc::new(FakeDestinationClient::failing(ProcessingRequirement::Raw));
        let bus = EventBus::new();
        let usage_store = Arc::new(InMemoryUsageLedgerStore::new());
        let guardrail = Arc::new(BufferedUsageGuardrail::new(org_with_no_limits(), usage_store, 1000));

        let orchestrator = SyncOrchestrator::new(
            &record_store,
            arf_store,
            vec![(DestinationRole::Active, failing)],
            &bus,
            guardrail,
        );

        let mut job = SyncJob::new(
            Uuid::new_v4(),
            sync_id,
            organization_id,
            ExecutionConfig::metered(),
            Utc::now(),
        );
        let sync = Sync::new(
            sync_id,
            organization_id,
            collection_id,
            SyncConnection::source(source_connection_id, "source", Utc::now()),
        );

        let source = Box::new(FixedBatchSource {
            batches: vec![vec![RawEntity::Content(entity("e1", "h1", sync_id, collection_id))]],
            index: 0,
            full_sync: false,
        });

        let err = orchestrator
            .run(&mut job, &sync, source_connection_id, source, None, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Upstream { .. }));
        assert_eq!(job.status(), SyncJobStatus::Failed);
        assert!(job.error_message().is_some());
    }

    #[tokio::test]
    async fn full_sync_exhaustion_deletes_orphaned_records() {
        let sync_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let source_connection_id = Uuid::new_v4();

        let record_store = InMemoryEntityRecordStore::new();
        record_store
            .upsert(airweave_core::EntityRecord {
                sync_id,
                entity_id: "stale".to_string(),
                entity_definition_id: "def".to_string(),
                hash: "h0".to_string(),
                last_seen_job_id: Uuid::new_v4(),
            })
            .await
            .unwrap();

        let arf_store = Arc::new(InMemoryArfStore::new());
        let active = Arc::new(FakeDestinationClient::new(ProcessingRequirement::Raw));
        let bus = EventBus::new();
        let usage_store = Arc::new(InMemoryUsageLedgerStore::new());
        let guardrail = Arc::new(BufferedUsageGuardrail::new(org_with_no_limits(), usage_store, 1000));

        let orchestrator = SyncOrchestrator::new(
            &record_store,
            arf_store,
            vec![(DestinationRole::Active, active.clone())],
            &bus,
            guardrail,
        );

        let mut job = SyncJob::new(
            Uuid::new_v4(),
            sync_id,
            organization_id,
            ExecutionConfig::metered(),
            Utc::now(),
        );
        let sync = Sync::new(
            sync_id,
            organization_id,
            collection_id,
            SyncConnection::source(source_connection_id, "source", Utc::now()),
        );

        let source = Box::new(FixedBatchSource {
            batches: vec![Vec::new()],
            index: 0,
            full_sync: true,
        });

        orchestrator
            .run(&mut job, &sync, source_connection_id, source, None, CancellationToken::new())
            .await
            .unwrap();

        assert!(record_store.get(sync_id, "stale", "def").await.unwrap().is_none());
        assert_eq!(active.deleted_ids(), vec!["stale".to_string()]);
    }
}
