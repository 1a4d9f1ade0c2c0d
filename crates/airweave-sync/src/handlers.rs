//! The three content handlers a dispatched action passes through:
//! destination writes, archival-replay storage, and entity metadata
//! bookkeeping.

use airweave_core::{CollectionEntityRecord, DestinationRole, Entity, EntityRecord, ProcessingRequirement};
use airweave_error::CoreError;
use async_trait::async_trait;
use uuid::Uuid;

use crate::action::ResolvedAction;
use crate::resolver::EntityRecordStore;

/// One destination's write surface. A real implementation dispatches to
/// the chunker/embedder pipeline matching `processing_requirement()`
/// before calling the destination's own client; that pipeline is out of
/// scope here, this trait is the seam below it.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Which processing pipeline this destination wants its content run
    /// through before being written.
    fn processing_requirement(&self) -> ProcessingRequirement;

    /// Write or overwrite one entity's content.
    async fn write(&self, entity: &Entity) -> Result<(), CoreError>;

    /// Remove one entity's content, keyed by identity.
    async fn delete(&self, entity_id: &str, entity_definition_id: &str) -> Result<(), CoreError>;
}

/// Writes entity content to every writable destination slot (active and
/// shadow). A shadow slot's failure is logged and otherwise ignored; an
/// active slot's failure aborts the action.
pub struct DestinationHandler {
    destinations: Vec<(DestinationRole, std::sync::Arc<dyn DestinationClient>)>,
}

impl DestinationHandler {
    /// Build a handler writing to the given destination slots.
    #[must_use]
    pub fn new(destinations: Vec<(DestinationRole, std::sync::Arc<dyn DestinationClient>)>) -> Self {
        Self { destinations }
    }

    /// Apply one action to every destination slot.
    ///
    /// # Errors
    /// Returns the first active-slot failure encountered; shadow-slot
    /// failures never surface here.
    pub async fn apply_one(&self, action: &ResolvedAction) -> Result<(), CoreError> {
        match action {
            ResolvedAction::Insert(entity) | ResolvedAction::Update { entity, .. } => {
                for (role, client) in &self.destinations {
                    if let Err(err) = client.write(entity).await {
                        if *role == DestinationRole::Shadow {
                            tracing::warn!(
                                entity_id = %entity.entity_id(),
                                error = %err,
                                "shadow destination write failed; ignored"
                            );
                            continue;
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
            ResolvedAction::Delete {
                entity_id,
                entity_definition_id,
            } => {
                for (role, client) in &self.destinations {
                    if let Err(err) = client.delete(entity_id, entity_definition_id).await {
                        if *role == DestinationRole::Shadow {
                            tracing::warn!(
                                entity_id = %entity_id,
                                error = %err,
                                "shadow destination delete failed; ignored"
                            );
                            continue;
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
            ResolvedAction::Keep(_) => Ok(()),
        }
    }
}

/// Archival-replay persistence boundary: raw entity payloads keyed by
/// `(sync_id, entity_id, entity_definition_id)`, read back by
/// [`crate::replay::ArfReplaySource`].
#[async_trait]
pub trait ArfStore: Send + Sync {
    /// Store an entity's raw payload for later replay.
    async fn put(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
        entity: &Entity,
    ) -> Result<(), CoreError>;

    /// Retrieve a previously stored payload.
    async fn get(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<Option<Entity>, CoreError>;
}

/// Writes the raw entity payload to archival-replay storage. Failures
/// here are tolerated and logged: ARF is a convenience for future
/// replay, never a condition for the job's success.
pub struct ArfHandler {
    sync_id: Uuid,
    store: std::sync::Arc<dyn ArfStore>,
}

impl ArfHandler {
    /// Build a handler writing into `store` for one sync.
    #[must_use]
    pub fn new(sync_id: Uuid, store: std::sync::Arc<dyn ArfStore>) -> Self {
        Self { sync_id, store }
    }

    /// Apply one action. Always returns `Ok`; failures are logged
    /// internally, matching the "tolerated, logged-only" contract the
    /// dispatcher relies on.
    pub async fn apply_one(&self, action: &ResolvedAction) {
        let (entity, entity_id, entity_definition_id) = match action {
            ResolvedAction::Insert(entity) | ResolvedAction::Update { entity, .. } => {
                (Some(entity), entity.entity_id(), entity.entity_definition_id())
            }
            ResolvedAction::Delete { .. } | ResolvedAction::Keep(_) => return,
        };
        let Some(entity) = entity else { return };
        if let Err(err) = self.store.put(self.sync_id, entity_id, entity_definition_id, entity).await {
            tracing::warn!(
                sync_id = %self.sync_id,
                entity_id = %entity_id,
                error = %err,
                "archival-replay write failed; tolerated"
            );
        }
    }
}

/// Writes the `EntityRecord` bookkeeping row and, when collection-level
/// dedup is enabled for the sync, the `CollectionEntityRecord` ownership
/// row. Runs after a successful (or skipped) [`DestinationHandler`] call
/// for the same action so a record is never marked up to date if the
/// content write it describes never happened.
pub struct EntityPostgresHandler<'a> {
    store: &'a dyn EntityRecordStore,
    sync_id: Uuid,
    job_id: Uuid,
    organization_id: Uuid,
    collection_id: Uuid,
    source_connection_id: Uuid,
    collection_dedup_enabled: bool,
}

impl<'a> EntityPostgresHandler<'a> {
    /// Build a handler scoped to one sync's job run.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a dyn EntityRecordStore,
        sync_id: Uuid,
        job_id: Uuid,
        organization_id: Uuid,
        collection_id: Uuid,
        source_connection_id: Uuid,
        collection_dedup_enabled: bool,
    ) -> Self {
        Self {
            store,
            sync_id,
            job_id,
            organization_id,
            collection_id,
            source_connection_id,
            collection_dedup_enabled,
        }
    }

    /// Apply one action's metadata effect.
    ///
    /// # Errors
    /// Propagates the underlying store's failure.
    pub async fn apply_one(&self, action: &ResolvedAction) -> Result<(), CoreError> {
        match action {
            ResolvedAction::Insert(entity) | ResolvedAction::Update { entity, .. } => {
                self.store
                    .upsert(EntityRecord {
                        sync_id: self.sync_id,
                        entity_id: entity.entity_id().to_string(),
                        entity_definition_id: entity.entity_definition_id().to_string(),
                        hash: entity.hash().to_string(),
                        last_seen_job_id: self.job_id,
                    })
                    .await?;
                self.claim_collection_ownership(entity).await
            }
            ResolvedAction::Keep(entity) => {
                self.store
                    .upsert(EntityRecord {
                        sync_id: self.sync_id,
                        entity_id: entity.entity_id().to_string(),
                        entity_definition_id: entity.entity_definition_id().to_string(),
                        hash: entity.hash().to_string(),
                        last_seen_job_id: self.job_id,
                    })
                    .await?;
                self.claim_collection_ownership(entity).await
            }
            ResolvedAction::Delete {
                entity_id,
                entity_definition_id,
            } => self.store.delete(self.sync_id, entity_id, entity_definition_id).await,
        }
    }

    /// Stamp this handler's source connection as the owner of `entity`'s
    /// collection-dedup identity. A no-op unless collection dedup is
    /// enabled for the sync; the losing side of a dedup conflict never
    /// reaches this handler (the dispatcher skips it), so this always
    /// writes the winner's row.
    async fn claim_collection_ownership(&self, entity: &Entity) -> Result<(), CoreError> {
        if !self.collection_dedup_enabled {
            return Ok(());
        }
        self.store
            .upsert_collection_record(CollectionEntityRecord {
                organization_id: self.organization_id,
                collection_id: self.collection_id,
                entity_id: entity.entity_id().to_string(),
                entity_definition_id: entity.entity_definition_id().to_string(),
                hash: entity.hash().to_string(),
                owning_source_connection_id: self.source_connection_id,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDestinationClient;
    use airweave_core::{EntityShape, SystemMetadata};
    use chrono::Utc;

    fn entity(id: &str) -> Entity {
        Entity::new(
            id,
            "def",
            "h1",
            EntityShape::Chunk { text: "hi".to_string() },
            Utc::now(),
            SystemMetadata {
                sync_id: Uuid::new_v4(),
                collection_id: Uuid::new_v4(),
                shape_tag: "chunk",
                deleted: false,
            },
        )
    }

    #[tokio::test]
    async fn shadow_write_failure_does_not_fail_the_action() {
        let active = std::sync::Arc::new(FakeDestinationClient::new(ProcessingRequirement::Raw));
        let shadow = std::sync::Arc::new(FakeDestinationClient::failing(ProcessingRequirement::Raw));
        let handler = DestinationHandler::new(vec![
            (DestinationRole::Active, active.clone()),
            (DestinationRole::Shadow, shadow),
        ]);

        let action = ResolvedAction::Insert(entity("e1"));
        handler.apply_one(&action).await.unwrap();
        assert_eq!(active.written_ids(), vec!["e1".to_string()]);
    }

    #[tokio::test]
    async fn active_write_failure_aborts() {
        let active = std::sync::Arc::new(FakeDestinationClient::failing(ProcessingRequirement::Raw));
        let handler = DestinationHandler::new(vec![(DestinationRole::Active, active)]);

        let action = ResolvedAction::Insert(entity("e1"));
        let err = handler.apply_one(&action).await.unwrap_err();
        assert!(matches!(err, CoreError::Upstream { .. }));
    }

    #[tokio::test]
    async fn entity_postgres_handler_bumps_last_seen_job_id_on_keep() {
        let store = crate::testing::InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let old_job = Uuid::new_v4();
        let new_job = Uuid::new_v4();
        store
            .upsert(EntityRecord {
                sync_id,
                entity_id: "e1".to_string(),
                entity_definition_id: "def".to_string(),
                hash: "h1".to_string(),
                last_seen_job_id: old_job,
            })
            .await
            .unwrap();

        let handler = EntityPostgresHandler::new(
            &store,
            sync_id,
            new_job,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            false,
        );
        let mut e = entity("e1");
        // Keep this entity's hash in sync with what is already stored.
        e = Entity::new(
            e.entity_id().to_string(),
            e.entity_definition_id().to_string(),
            "h1",
            e.shape().clone(),
            e.updated_at(),
            e.metadata().clone(),
        );
        handler.apply_one(&ResolvedAction::Keep(e)).await.unwrap();

        let record = store.get(sync_id, "e1", "def").await.unwrap().unwrap();
        assert_eq!(record.last_seen_job_id, new_job);
    }

    #[tokio::test]
    async fn entity_postgres_handler_deletes_are_idempotent() {
        let store = crate::testing::InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let handler = EntityPostgresHandler::new(
            &store,
            sync_id,
            job_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            false,
        );

        let action = ResolvedAction::Delete {
            entity_id: "ghost".to_string(),
            entity_definition_id: "def".to_string(),
        };
        handler.apply_one(&action).await.unwrap();
        handler.apply_one(&action).await.unwrap();
        assert!(store.get(sync_id, "ghost", "def").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_claims_collection_ownership_when_dedup_enabled() {
        let store = crate::testing::InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let source_connection_id = Uuid::new_v4();

        let handler = EntityPostgresHandler::new(
            &store,
            sync_id,
            job_id,
            organization_id,
            collection_id,
            source_connection_id,
            true,
        );
        handler.apply_one(&ResolvedAction::Insert(entity("e1"))).await.unwrap();

        let record = store
            .get_collection_record(organization_id, collection_id, "e1", "def")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.owning_source_connection_id, source_connection_id);
    }

    #[tokio::test]
    async fn insert_does_not_touch_collection_record_when_dedup_disabled() {
        let store = crate::testing::InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();

        let handler = EntityPostgresHandler::new(&store, sync_id, job_id, organization_id, collection_id, Uuid::new_v4(), false);
        handler.apply_one(&ResolvedAction::Insert(entity("e1"))).await.unwrap();

        assert!(store
            .get_collection_record(organization_id, collection_id, "e1", "def")
            .await
            .unwrap()
            .is_none());
    }
}
