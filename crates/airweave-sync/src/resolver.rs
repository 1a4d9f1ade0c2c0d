//! Entity action resolution: given a raw entity and whatever stored
//! record matches its identity, decide Insert/Update/Keep/Delete.

use airweave_core::{CollectionEntityRecord, EntityRecord};
use airweave_error::CoreError;
use async_trait::async_trait;
use uuid::Uuid;

use crate::action::{handler_names, BatchAction, EntityActionBatch, ResolvedAction};
use crate::source::RawEntity;

/// Persistence boundary for the records the resolver consults and
/// updates. A database-backed implementation lives outside this crate;
/// [`crate::testing::InMemoryEntityRecordStore`] backs the resolver's own
/// tests.
#[async_trait]
pub trait EntityRecordStore: Send + Sync {
    /// Look up the per-sync record for an identity, if one exists.
    async fn get(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<Option<EntityRecord>, CoreError>;

    /// Insert or overwrite a per-sync record.
    async fn upsert(&self, record: EntityRecord) -> Result<(), CoreError>;

    /// Remove a per-sync record. Idempotent: deleting an identity with
    /// no stored record is not an error.
    async fn delete(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<(), CoreError>;

    /// Records for this sync whose `last_seen_job_id` is not
    /// `current_job_id` — candidates for orphan deletion at the end of a
    /// full sync.
    async fn list_stale(&self, sync_id: Uuid, current_job_id: Uuid) -> Result<Vec<EntityRecord>, CoreError>;

    /// Every record currently stored for a sync. Used to enumerate the
    /// identity set an ARF replay source pages through.
    async fn list_all(&self, sync_id: Uuid) -> Result<Vec<EntityRecord>, CoreError>;

    /// Look up the collection-scoped record for an identity, if one
    /// exists. Used only when the owning sync has collection dedup
    /// enabled.
    async fn get_collection_record(
        &self,
        organization_id: Uuid,
        collection_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<Option<CollectionEntityRecord>, CoreError>;

    /// Insert or overwrite a collection-scoped record.
    async fn upsert_collection_record(&self, record: CollectionEntityRecord) -> Result<(), CoreError>;
}

/// Per-job parameters the resolver needs but that do not belong on the
/// store itself.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// The sync being run.
    pub sync_id: Uuid,
    /// The job this resolution is happening within; stamped onto every
    /// touched `EntityRecord` as `last_seen_job_id`.
    pub job_id: Uuid,
    /// Owning tenant.
    pub organization_id: Uuid,
    /// The collection this sync feeds.
    pub collection_id: Uuid,
    /// The source connection producing these entities, used as the
    /// dedup-ownership key.
    pub source_connection_id: Uuid,
    /// Whether collection-level dedup is enabled for this sync.
    pub collection_dedup_enabled: bool,
    /// ARF replay mode: every non-deletion entity resolves by presence
    /// alone, ignoring hash comparison.
    pub skip_hash_comparison: bool,
    /// Never emit `Update`; a changed hash resolves to `Keep` instead.
    pub skip_updates: bool,
}

/// Resolves raw entities into dispatch-ready actions against an
/// [`EntityRecordStore`].
pub struct EntityActionResolver<'a> {
    store: &'a dyn EntityRecordStore,
    config: ResolverConfig,
}

impl<'a> EntityActionResolver<'a> {
    /// Build a resolver for one job's worth of batches.
    #[must_use]
    pub fn new(store: &'a dyn EntityRecordStore, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    /// Resolve one batch of raw entities in emission order.
    ///
    /// # Errors
    /// Returns [`CoreError::SyncFailure`] if any entity carries an empty
    /// identity key — malformed input the source must not produce.
    pub async fn resolve(&self, raw_entities: Vec<RawEntity>) -> Result<EntityActionBatch, CoreError> {
        let mut batch = EntityActionBatch::new();
        for raw in raw_entities {
            let (entity_id, entity_definition_id) = raw.identity();
            if entity_id.is_empty() || entity_definition_id.is_empty() {
                return Err(CoreError::SyncFailure {
                    message: "entity carries an empty identity key".to_string(),
                });
            }

            match raw {
                RawEntity::Deletion(deletion) => {
                    let stored = self
                        .store
                        .get(
                            self.config.sync_id,
                            deletion.entity_id(),
                            deletion.entity_definition_id(),
                        )
                        .await?;
                    if stored.is_some() {
                        batch.actions.push(BatchAction::new(ResolvedAction::Delete {
                            entity_id: deletion.entity_id().to_string(),
                            entity_definition_id: deletion.entity_definition_id().to_string(),
                        }));
                    }
                    // DeletionEntity absent: no stored record, nothing to do.
                }
                RawEntity::Content(entity) => {
                    if self.config.collection_dedup_enabled {
                        self.resolve_with_collection_dedup(entity, &mut batch).await?;
                    } else {
                        self.resolve_per_sync(entity, &mut batch).await?;
                    }
                }
            }
        }
        Ok(batch)
    }

    async fn resolve_per_sync(
        &self,
        entity: airweave_core::Entity,
        batch: &mut EntityActionBatch,
    ) -> Result<(), CoreError> {
        let stored = self
            .store
            .get(self.config.sync_id, entity.entity_id(), entity.entity_definition_id())
            .await?;

        let action = match stored {
            None => ResolvedAction::Insert(entity),
            Some(record) if self.config.skip_hash_comparison => ResolvedAction::Update {
                prior_hash: record.hash,
                entity,
            },
            Some(record) if record.hash == entity.hash() => ResolvedAction::Keep(entity),
            Some(record) if self.config.skip_updates => ResolvedAction::Keep(entity),
            Some(record) => ResolvedAction::Update {
                prior_hash: record.hash,
                entity,
            },
        };

        batch.actions.push(match &action {
            ResolvedAction::Keep(_) => BatchAction::skipping(
                action,
                &[handler_names::DESTINATION, handler_names::ARF],
            ),
            _ => BatchAction::new(action),
        });
        Ok(())
    }

    async fn resolve_with_collection_dedup(
        &self,
        entity: airweave_core::Entity,
        batch: &mut EntityActionBatch,
    ) -> Result<(), CoreError> {
        let existing = self
            .store
            .get_collection_record(
                self.config.organization_id,
                self.config.collection_id,
                entity.entity_id(),
                entity.entity_definition_id(),
            )
            .await?;

        match existing {
            Some(record) if record.owning_source_connection_id != self.config.source_connection_id => {
                // Losing source: must not re-emit content, but the
                // metadata handler still runs so this sync's own
                // last-seen bookkeeping stays current.
                batch.actions.push(BatchAction::skipping(
                    ResolvedAction::Keep(entity),
                    &[handler_names::DESTINATION, handler_names::ARF],
                ));
                Ok(())
            }
            Some(record) => {
                // We already own this identity; resolve as normal against
                // our own prior hash.
                let action = if self.config.skip_hash_comparison {
                    ResolvedAction::Update {
                        prior_hash: record.hash,
                        entity,
                    }
                } else if record.hash == entity.hash() {
                    ResolvedAction::Keep(entity)
                } else if self.config.skip_updates {
                    ResolvedAction::Keep(entity)
                } else {
                    ResolvedAction::Update {
                        prior_hash: record.hash,
                        entity,
                    }
                };
                batch.actions.push(match &action {
                    ResolvedAction::Keep(_) => BatchAction::skipping(
                        action,
                        &[handler_names::DESTINATION, handler_names::ARF],
                    ),
                    _ => BatchAction::new(action),
                });
                Ok(())
            }
            None => {
                batch.actions.push(BatchAction::new(ResolvedAction::Insert(entity)));
                Ok(())
            }
        }
    }

    /// Find and return Delete actions for records this sync touched in
    /// an earlier job but not the current one. Called once, after the
    /// source is exhausted, only for a full sync.
    ///
    /// # Errors
    /// Propagates the store's lookup error.
    pub async fn resolve_orphans(&self) -> Result<EntityActionBatch, CoreError> {
        let stale = self
            .store
            .list_stale(self.config.sync_id, self.config.job_id)
            .await?;
        let mut batch = EntityActionBatch::new();
        for record in stale {
            batch.actions.push(BatchAction::new(ResolvedAction::Delete {
                entity_id: record.entity_id,
                entity_definition_id: record.entity_definition_id,
            }));
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryEntityRecordStore;
    use airweave_core::{Entity, EntityShape, SystemMetadata};
    use chrono::Utc;

    fn meta(sync_id: Uuid, collection_id: Uuid) -> SystemMetadata {
        SystemMetadata {
            sync_id,
            collection_id,
            shape_tag: "chunk",
            deleted: false,
        }
    }

    fn entity(sync_id: Uuid, collection_id: Uuid, id: &str, hash: &str) -> Entity {
        Entity::new(
            id,
            "def",
            hash,
            EntityShape::Chunk { text: "hi".to_string() },
            Utc::now(),
            meta(sync_id, collection_id),
        )
    }

    fn config(sync_id: Uuid, job_id: Uuid, organization_id: Uuid, collection_id: Uuid) -> ResolverConfig {
        ResolverConfig {
            sync_id,
            job_id,
            organization_id,
            collection_id,
            source_connection_id: Uuid::new_v4(),
            collection_dedup_enabled: false,
            skip_hash_comparison: false,
            skip_updates: false,
        }
    }

    #[tokio::test]
    async fn absent_record_resolves_to_insert() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let resolver = EntityActionResolver::new(&store, config(sync_id, job_id, org_id, collection_id));

        let batch = resolver
            .resolve(vec![RawEntity::Content(entity(sync_id, collection_id, "e1", "h1"))])
            .await
            .unwrap();

        assert_eq!(batch.actions.len(), 1);
        assert!(matches!(batch.actions[0].action, ResolvedAction::Insert(_)));
    }

    #[tokio::test]
    async fn matching_hash_resolves_to_keep_and_skips_content_handlers() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        store
            .upsert(EntityRecord {
                sync_id,
                entity_id: "e1".to_string(),
                entity_definition_id: "def".to_string(),
                hash: "h1".to_string(),
                last_seen_job_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        let resolver = EntityActionResolver::new(&store, config(sync_id, job_id, org_id, collection_id));

        let batch = resolver
            .resolve(vec![RawEntity::Content(entity(sync_id, collection_id, "e1", "h1"))])
            .await
            .unwrap();

        assert!(matches!(batch.actions[0].action, ResolvedAction::Keep(_)));
        assert!(batch.actions[0].skip_content_handlers.contains(handler_names::DESTINATION));
    }

    #[tokio::test]
    async fn changed_hash_resolves_to_update() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        store
            .upsert(EntityRecord {
                sync_id,
                entity_id: "e1".to_string(),
                entity_definition_id: "def".to_string(),
                hash: "old".to_string(),
                last_seen_job_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        let resolver = EntityActionResolver::new(&store, config(sync_id, job_id, org_id, collection_id));

        let batch = resolver
            .resolve(vec![RawEntity::Content(entity(sync_id, collection_id, "e1", "new"))])
            .await
            .unwrap();

        assert!(matches!(batch.actions[0].action, ResolvedAction::Update { .. }));
    }

    #[tokio::test]
    async fn deletion_with_no_stored_record_is_a_silent_no_op() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let resolver = EntityActionResolver::new(&store, config(sync_id, job_id, org_id, collection_id));

        let deletion = airweave_core::DeletionEntity::new("ghost", "def", meta(sync_id, collection_id));
        let batch = resolver.resolve(vec![RawEntity::Deletion(deletion)]).await.unwrap();

        assert!(batch.actions.is_empty());
    }

    #[tokio::test]
    async fn deletion_with_stored_record_resolves_to_delete() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        store
            .upsert(EntityRecord {
                sync_id,
                entity_id: "e1".to_string(),
                entity_definition_id: "def".to_string(),
                hash: "h1".to_string(),
                last_seen_job_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        let resolver = EntityActionResolver::new(&store, config(sync_id, job_id, org_id, collection_id));

        let deletion = airweave_core::DeletionEntity::new("e1", "def", meta(sync_id, collection_id));
        let batch = resolver.resolve(vec![RawEntity::Deletion(deletion)]).await.unwrap();

        assert!(matches!(batch.actions[0].action, ResolvedAction::Delete { .. }));
    }

    #[tokio::test]
    async fn malformed_identity_fails_the_batch() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let resolver = EntityActionResolver::new(&store, config(sync_id, job_id, org_id, collection_id));

        let bad = Entity::new(
            String::new(),
            "def",
            "h1",
            EntityShape::Chunk { text: "hi".to_string() },
            Utc::now(),
            meta(sync_id, collection_id),
        );
        let err = resolver.resolve(vec![RawEntity::Content(bad)]).await.unwrap_err();
        assert!(matches!(err, CoreError::SyncFailure { .. }));
    }

    #[tokio::test]
    async fn collection_dedup_conflict_resolves_to_keep_and_suppresses_content_writes_only() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let winner_connection = Uuid::new_v4();
        store
            .upsert_collection_record(CollectionEntityRecord {
                organization_id: org_id,
                collection_id,
                entity_id: "shared".to_string(),
                entity_definition_id: "def".to_string(),
                hash: "h1".to_string(),
                owning_source_connection_id: winner_connection,
            })
            .await
            .unwrap();

        let mut cfg = config(sync_id, job_id, org_id, collection_id);
        cfg.collection_dedup_enabled = true;
        let resolver = EntityActionResolver::new(&store, cfg);

        let batch = resolver
            .resolve(vec![RawEntity::Content(entity(sync_id, collection_id, "shared", "h1"))])
            .await
            .unwrap();

        assert!(matches!(batch.actions[0].action, ResolvedAction::Keep(_)));
        assert_eq!(batch.actions[0].skip_content_handlers.len(), 2);
        assert!(batch.actions[0].skip_content_handlers.contains(handler_names::DESTINATION));
        assert!(batch.actions[0].skip_content_handlers.contains(handler_names::ARF));
        assert!(!batch.actions[0].skip_content_handlers.contains(handler_names::ENTITY_POSTGRES));
    }

    /// The winner's Insert claims ownership through the live write path
    /// (the metadata handler, not a manually pre-seeded record), and a
    /// second source connection resolving the same identity afterward is
    /// the one that sees the conflict.
    #[tokio::test]
    async fn winning_insert_claims_ownership_so_a_second_source_loses() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let first_connection = Uuid::new_v4();
        let second_connection = Uuid::new_v4();

        let mut first_cfg = config(sync_id, job_id, org_id, collection_id);
        first_cfg.source_connection_id = first_connection;
        first_cfg.collection_dedup_enabled = true;
        let first_resolver = EntityActionResolver::new(&store, first_cfg);
        let first_batch = first_resolver
            .resolve(vec![RawEntity::Content(entity(sync_id, collection_id, "shared", "h1"))])
            .await
            .unwrap();
        assert!(matches!(first_batch.actions[0].action, ResolvedAction::Insert(_)));

        // No component has written the ownership row yet: this is the
        // handler's job, run here exactly as the dispatcher would.
        assert!(store
            .get_collection_record(org_id, collection_id, "shared", "def")
            .await
            .unwrap()
            .is_none());
        let handler = crate::handlers::EntityPostgresHandler::new(
            &store,
            sync_id,
            job_id,
            org_id,
            collection_id,
            first_connection,
            true,
        );
        handler.apply_one(&first_batch.actions[0].action).await.unwrap();

        let mut second_cfg = config(sync_id, Uuid::new_v4(), org_id, collection_id);
        second_cfg.source_connection_id = second_connection;
        second_cfg.collection_dedup_enabled = true;
        let second_resolver = EntityActionResolver::new(&store, second_cfg);
        let second_batch = second_resolver
            .resolve(vec![RawEntity::Content(entity(sync_id, collection_id, "shared", "h1"))])
            .await
            .unwrap();

        assert!(matches!(second_batch.actions[0].action, ResolvedAction::Keep(_)));
        assert_eq!(second_batch.actions[0].skip_content_handlers.len(), 2);
        assert!(!second_batch.actions[0].skip_content_handlers.contains(handler_names::ENTITY_POSTGRES));
    }

    #[tokio::test]
    async fn orphan_detection_deletes_records_from_older_jobs() {
        let store = InMemoryEntityRecordStore::new();
        let sync_id = Uuid::new_v4();
        let old_job = Uuid::new_v4();
        let current_job = Uuid::new_v4();
        let org_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        store
            .upsert(EntityRecord {
                sync_id,
                entity_id: "stale".to_string(),
                entity_definition_id: "def".to_string(),
                hash: "h1".to_string(),
                last_seen_job_id: old_job,
            })
            .await
            .unwrap();

        let resolver =
            EntityActionResolver::new(&store, config(sync_id, current_job, org_id, collection_id));
        let orphans = resolver.resolve_orphans().await.unwrap();

        assert_eq!(orphans.actions.len(), 1);
        assert!(matches!(orphans.actions[0].action, ResolvedAction::Delete { .. }));
    }
}
