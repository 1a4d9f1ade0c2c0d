//! Archival-replay as a pseudo-source, and the fork-destination
//! operation built on top of it: create a shadow slot, replay every
//! entity from ARF storage into it, then atomically promote it to
//! active.

use airweave_core::{DestinationRole, Sync, SyncConnection};
use airweave_error::CoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::cursor::SyncCursor;
use crate::handlers::ArfStore;
use crate::source::RawEntity;

/// A [`crate::source::Source`] that replays a sync's previously-ARF'd
/// content instead of contacting the original upstream connector. Used
/// to backfill a newly forked destination without re-running discovery
/// against the real source, which may be slow, rate-limited, or no
/// longer reflect what was originally ingested.
pub struct ArfReplaySource {
    sync_id: Uuid,
    store: std::sync::Arc<dyn ArfStore>,
    identities: Vec<(String, String)>,
    batch_size: usize,
}

impl ArfReplaySource {
    /// Build a replay source over a fixed identity set, typically the
    /// full `EntityRecordStore::list_all` result for the sync being
    /// forked.
    #[must_use]
    pub fn new(
        sync_id: Uuid,
        store: std::sync::Arc<dyn ArfStore>,
        identities: Vec<(String, String)>,
        batch_size: usize,
    ) -> Self {
        Self {
            sync_id,
            store,
            identities,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl crate::source::Source for ArfReplaySource {
    async fn next_batch(
        &mut self,
        cursor: Option<&SyncCursor>,
    ) -> Result<(Vec<RawEntity>, Option<SyncCursor>, bool), CoreError> {
        let offset = match cursor {
            None => 0,
            Some(cursor) => cursor
                .decode()?
                .get("offset")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as usize,
        };

        let end = (offset + self.batch_size).min(self.identities.len());
        let mut batch = Vec::with_capacity(end.saturating_sub(offset));
        for (entity_id, entity_definition_id) in &self.identities[offset..end] {
            if let Some(entity) = self.store.get(self.sync_id, entity_id, entity_definition_id).await? {
                batch.push(RawEntity::Content(entity));
            }
        }

        let done = end >= self.identities.len();
        let next_cursor = SyncCursor::encode(&json!({ "offset": end }));
        Ok((batch, Some(next_cursor), done))
    }

    fn is_full_sync(&self) -> bool {
        // Replay never triggers orphan detection: the identity set it
        // pages through already came from the live record store, so
        // anything not replayed was already excluded upstream.
        false
    }
}

/// Begin forking a sync's active destination: add a new shadow slot
/// bound to `new_connection_id`. The caller then runs an
/// [`ArfReplaySource`]-driven job against this sync before calling
/// [`complete_fork`].
///
/// # Errors
/// Propagates [`Sync::add_destination_slot`]'s failure if the sync
/// already has an unrelated invariant violation.
pub fn begin_fork(
    sync: &mut Sync,
    new_connection_id: Uuid,
    connection_name: impl Into<String>,
) -> Result<(), CoreError> {
    sync.add_destination_slot(SyncConnection::destination(
        new_connection_id,
        connection_name,
        DestinationRole::Shadow,
        Utc::now(),
    ))
}

/// Complete a fork: atomically promote the shadow slot to active and
/// demote the prior active slot to deprecated. Callers must only invoke
/// this after a replay job driven by [`ArfReplaySource`] against
/// `new_connection_id` has completed successfully.
///
/// # Errors
/// Returns [`CoreError::NotFound`] if `new_connection_id` is not a slot
/// on this sync.
pub fn complete_fork(sync: &mut Sync, new_connection_id: Uuid) -> Result<(), CoreError> {
    sync.promote_destination(new_connection_id)
}
