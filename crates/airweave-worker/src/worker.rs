//! A simulated workflow worker: the in-process stand-in for the
//! Temporal-backed worker spec.md's OVERVIEW says drives every sync run
//! ("scheduled, executed by a workflow worker"). Real workflow dispatch,
//! durability, and retries are out of scope; this type exposes the same
//! three operations the original's `TemporalServiceProtocol` fake
//! (`run_source_connection_workflow`, `cancel_sync_job_workflow`) exposes,
//! minus scheduling, and drives them synchronously against
//! [`airweave_sync::SyncOrchestrator`] instead of dispatching to a
//! workflow engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use airweave_core::{DestinationRole, ProcessingRequirement, Sync, SyncJob};
use airweave_error::CoreError;
use airweave_sync::testing::{FakeDestinationClient, InMemoryArfStore, InMemoryEntityRecordStore};
use airweave_sync::{CancellationToken, SyncCursor, SyncOrchestrator};
use uuid::Uuid;

use crate::container::Container;

/// Drives sync jobs in-process, one `tokio::task` per running job,
/// matching spec §5's concurrency model. Destination client adapters
/// (Qdrant/Vespa) are out of scope, so every destination slot is backed
/// by an in-memory [`FakeDestinationClient`] that always succeeds —
/// documented here as a simulation, not a production destination.
pub struct WorkflowWorker {
    container: Arc<Container>,
    record_store: Arc<InMemoryEntityRecordStore>,
    arf_store: Arc<InMemoryArfStore>,
    cancellations: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl WorkflowWorker {
    /// Build a worker sharing `container`'s process-wide collaborators.
    #[must_use]
    pub fn new(container: Arc<Container>) -> Self {
        Self {
            container,
            record_store: Arc::new(InMemoryEntityRecordStore::new()),
            arf_store: Arc::new(InMemoryArfStore::new()),
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    /// Equivalent of `run_source_connection_workflow`: run `job` to
    /// completion (or cancellation, or failure) against `sync`, pulling
    /// from `source`. Registers a [`CancellationToken`] under the job's
    /// id so a concurrent [`Self::cancel_sync_job_workflow`] call can
    /// stop it at the next batch boundary.
    ///
    /// # Errors
    /// Propagates [`SyncOrchestrator::run`]'s error after the job has
    /// been transitioned to `Failed`.
    pub async fn run_source_connection_workflow(
        &self,
        job: &mut SyncJob,
        sync: &Sync,
        source_connection_id: Uuid,
        source: Box<dyn airweave_sync::Source>,
    ) -> Result<(), CoreError> {
        let cancellation = CancellationToken::new();
        #[allow(clippy::unwrap_used)]
        self.cancellations.lock().unwrap().insert(job.id(), cancellation.clone());

        let destinations: Vec<(DestinationRole, Arc<dyn airweave_sync::DestinationClient>)> = sync
            .writable_destinations()
            .map(|slot| {
                #[allow(clippy::unwrap_used)]
                let role = slot.role().unwrap();
                let client: Arc<dyn airweave_sync::DestinationClient> =
                    Arc::new(FakeDestinationClient::new(ProcessingRequirement::Raw));
                (role, client)
            })
            .collect();

        let guardrail = self.container.guardrail_factory.create(
            self.container
                .organizations
                .get(job.organization_id())
                .unwrap_or_else(|| airweave_core::Organization::new(job.organization_id(), "unknown")),
        );

        let orchestrator = SyncOrchestrator::new(
            self.record_store.as_ref(),
            self.arf_store.clone(),
            destinations,
            self.container.event_bus.as_ref(),
            guardrail,
        );

        let cursor: Option<SyncCursor> = None;
        let result = orchestrator
            .run(job, sync, source_connection_id, source, cursor, cancellation)
            .await;

        #[allow(clippy::unwrap_used)]
        self.cancellations.lock().unwrap().remove(&job.id());
        result
    }

    /// Equivalent of `cancel_sync_job_workflow`: signal cancellation for
    /// a running job. A no-op if the job is not currently tracked (it
    /// already finished, or never started).
    pub fn cancel_sync_job_workflow(&self, job_id: Uuid) -> bool {
        #[allow(clippy::unwrap_used)]
        let cancellations = self.cancellations.lock().unwrap();
        if let Some(token) = cancellations.get(&job_id) {
            token.cancel();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airweave_core::{Entity, EntityShape, ExecutionConfig, SyncConnection, SystemMetadata};
    use airweave_sync::RawEntity;
    use async_trait::async_trait;
    use chrono::Utc;

    struct OneBatchSource {
        delivered: bool,
        sync_id: Uuid,
        collection_id: Uuid,
    }

    #[async_trait]
    impl airweave_sync::Source for OneBatchSource {
        async fn next_batch(
            &mut self,
            _cursor: Option<&SyncCursor>,
        ) -> Result<(Vec<RawEntity>, Option<SyncCursor>, bool), CoreError> {
            if self.delivered {
                return Ok((Vec::new(), None, true));
            }
            self.delivered = true;
            let entity = Entity::new(
                "e1",
                "def",
                "h1",
                EntityShape::Chunk { text: "hi".to_string() },
                Utc::now(),
                SystemMetadata {
                    sync_id: self.sync_id,
                    collection_id: self.collection_id,
                    shape_tag: "chunk",
                    deleted: false,
                },
            );
            Ok((vec![RawEntity::Content(entity)], Some(SyncCursor::encode(&serde_json::json!({"offset": 1}))), false))
        }

        fn is_full_sync(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn runs_a_job_to_completion() {
        let container = Arc::new(Container::build(airweave_core::RuntimeConfig::default(), [1u8; 32]).await.unwrap());
        let worker = WorkflowWorker::new(container.clone());

        let organization_id = Uuid::new_v4();
        container.organizations.insert(airweave_core::Organization::new(organization_id, "acme"));

        let sync_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let source_connection_id = Uuid::new_v4();
        let mut sync = Sync::new(
            sync_id,
            organization_id,
            collection_id,
            SyncConnection::source(source_connection_id, "source", Utc::now()),
        );
        sync.add_destination_slot(SyncConnection::destination(
            Uuid::new_v4(),
            "destination",
            DestinationRole::Active,
            Utc::now(),
        ))
        .unwrap();

        let mut job = SyncJob::new(Uuid::new_v4(), sync_id, organization_id, ExecutionConfig::metered(), Utc::now());
        let source = Box::new(OneBatchSource { delivered: false, sync_id, collection_id });

        worker
            .run_source_connection_workflow(&mut job, &sync, source_connection_id, source)
            .await
            .unwrap();

        assert_eq!(job.status(), airweave_core::SyncJobStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_on_an_unknown_job_is_a_harmless_no_op() {
        let container = Arc::new(Container::build(airweave_core::RuntimeConfig::default(), [2u8; 32]).await.unwrap());
        let worker = WorkflowWorker::new(container);
        assert!(!worker.cancel_sync_job_workflow(Uuid::new_v4()));
    }
}
