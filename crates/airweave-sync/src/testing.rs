//! In-memory test doubles for this crate's store and client boundaries.
//! Not feature-gated behind `#[cfg(test)]` at the module level so that
//! downstream crates (notably `airweave-worker`) can reuse them for
//! integration-style tests without duplicating the doubles.

use std::collections::HashMap;
use std::sync::Mutex;

use airweave_core::{CollectionEntityRecord, Entity, EntityRecord};
use airweave_error::CoreError;
use async_trait::async_trait;
use uuid::Uuid;

use crate::handlers::{ArfStore, DestinationClient};
use crate::resolver::EntityRecordStore;

type SyncKey = (Uuid, String, String);
type CollectionKey = (Uuid, Uuid, String, String);

/// An in-memory [`EntityRecordStore`], keyed the same way the real
/// persistence layer would be.
#[derive(Default)]
pub struct InMemoryEntityRecordStore {
    sync_records: Mutex<HashMap<SyncKey, EntityRecord>>,
    collection_records: Mutex<HashMap<CollectionKey, CollectionEntityRecord>>,
}

impl InMemoryEntityRecordStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityRecordStore for InMemoryEntityRecordStore {
    async fn get(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<Option<EntityRecord>, CoreError> {
        #[allow(clippy::unwrap_used)]
        let records = self.sync_records.lock().unwrap();
        Ok(records
            .get(&(sync_id, entity_id.to_string(), entity_definition_id.to_string()))
            .cloned())
    }

    async fn upsert(&self, record: EntityRecord) -> Result<(), CoreError> {
        #[allow(clippy::unwrap_used)]
        let mut records = self.sync_records.lock().unwrap();
        let key = (record.sync_id, record.entity_id.clone(), record.entity_definition_id.clone());
        records.insert(key, record);
        Ok(())
    }

    async fn delete(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<(), CoreError> {
        #[allow(clippy::unwrap_used)]
        let mut records = self.sync_records.lock().unwrap();
        records.remove(&(sync_id, entity_id.to_string(), entity_definition_id.to_string()));
        Ok(())
    }

    async fn list_stale(&self, sync_id: Uuid, current_job_id: Uuid) -> Result<Vec<EntityRecord>, CoreError> {
        #[allow(clippy::unwrap_used)]
        let records = self.sync_records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| r.sync_id == sync_id && r.last_seen_job_id != current_job_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self, sync_id: Uuid) -> Result<Vec<EntityRecord>, CoreError> {
        #[allow(clippy::unwrap_used)]
        let records = self.sync_records.lock().unwrap();
        Ok(records.values().filter(|r| r.sync_id == sync_id).cloned().collect())
    }

    async fn get_collection_record(
        &self,
        organization_id: Uuid,
        collection_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<Option<CollectionEntityRecord>, CoreError> {
        #[allow(clippy::unwrap_used)]
        let records = self.collection_records.lock().unwrap();
        Ok(records
            .get(&(
                organization_id,
                collection_id,
                entity_id.to_string(),
                entity_definition_id.to_string(),
            ))
            .cloned())
    }

    async fn upsert_collection_record(&self, record: CollectionEntityRecord) -> Result<(), CoreError> {
        #[allow(clippy::unwrap_used)]
        let mut records = self.collection_records.lock().unwrap();
        let key = (
            record.organization_id,
            record.collection_id,
            record.entity_id.clone(),
            record.entity_definition_id.clone(),
        );
        records.insert(key, record);
        Ok(())
    }
}

/// An in-memory [`ArfStore`] recording every write keyed the same way
/// the real archival store would be.
#[derive(Default)]
pub struct InMemoryArfStore {
    payloads: Mutex<HashMap<(Uuid, String, String), Entity>>,
}

impl InMemoryArfStore {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads currently held, for test assertions.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::unwrap_used)]
        self.payloads.lock().unwrap().len()
    }

    /// Whether the store holds no payloads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArfStore for InMemoryArfStore {
    async fn put(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
        entity: &Entity,
    ) -> Result<(), CoreError> {
        #[allow(clippy::unwrap_used)]
        let mut payloads = self.payloads.lock().unwrap();
        payloads.insert(
            (sync_id, entity_id.to_string(), entity_definition_id.to_string()),
            entity.clone(),
        );
        Ok(())
    }

    async fn get(
        &self,
        sync_id: Uuid,
        entity_id: &str,
        entity_definition_id: &str,
    ) -> Result<Option<Entity>, CoreError> {
        #[allow(clippy::unwrap_used)]
        let payloads = self.payloads.lock().unwrap();
        Ok(payloads
            .get(&(sync_id, entity_id.to_string(), entity_definition_id.to_string()))
            .cloned())
    }
}

/// A [`DestinationClient`] double that records every call and can be
/// configured to fail on demand, used to exercise shadow-write isolation
/// and active-write failure propagation.
pub struct FakeDestinationClient {
    requirement: airweave_core::ProcessingRequirement,
    fail_writes: bool,
    writes: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeDestinationClient {
    /// Build a client that always succeeds.
    #[must_use]
    pub fn new(requirement: airweave_core::ProcessingRequirement) -> Self {
        Self {
            requirement,
            fail_writes: false,
            writes: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    /// Build a client whose every write fails.
    #[must_use]
    pub fn failing(requirement: airweave_core::ProcessingRequirement) -> Self {
        Self {
            requirement,
            fail_writes: true,
            writes: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    /// Entity ids written so far, in call order.
    #[must_use]
    pub fn written_ids(&self) -> Vec<String> {
        #[allow(clippy::unwrap_used)]
        self.writes.lock().unwrap().clone()
    }

    /// Entity ids deleted so far, in call order.
    #[must_use]
    pub fn deleted_ids(&self) -> Vec<String> {
        #[allow(clippy::unwrap_used)]
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationClient for FakeDestinationClient {
    fn processing_requirement(&self) -> airweave_core::ProcessingRequirement {
        self.requirement
    }

    async fn write(&self, entity: &Entity) -> Result<(), CoreError> {
        if self.fail_writes {
            return Err(CoreError::Upstream {
                service: "fake-destination".to_string(),
                message: "fake destination configured to fail".to_string(),
            });
        }
        #[allow(clippy::unwrap_used)]
        self.writes.lock().unwrap().push(entity.entity_id().to_string());
        Ok(())
    }

    async fn delete(&self, entity_id: &str, _entity_definition_id: &str) -> Result<(), CoreError> {
        if self.fail_writes {
            return Err(CoreError::Upstream {
                service: "fake-destination".to_string(),
                message: "fake destination configured to fail".to_string(),
            });
        }
        #[allow(clippy::unwrap_used)]
        self.deletes.lock().unwrap().push(entity_id.to_string());
        Ok(())
    }
}
