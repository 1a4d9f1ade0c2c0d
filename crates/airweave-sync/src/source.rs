//! The source contract the orchestrator drives: an async iterator over
//! batches of raw entities, paired with a cursor the source defines and
//! the orchestrator never inspects.

use airweave_error::CoreError;
use async_trait::async_trait;
use airweave_core::{DeletionEntity, Entity};

use crate::cursor::SyncCursor;

/// One unit emitted by a source: either content or a deletion marker.
/// Kept as an enum rather than two separate streams so a source can
/// interleave both within a single batch, matching how most connectors
/// actually discover deletions (a full listing diffed against cursor
/// state, rather than a dedicated deletion feed).
#[derive(Debug, Clone)]
pub enum RawEntity {
    /// New or changed content.
    Content(Entity),
    /// A marker that previously-seen content no longer exists upstream.
    Deletion(DeletionEntity),
}

impl RawEntity {
    /// The `(entity_id, entity_definition_id)` identity pair, regardless
    /// of which variant this is.
    #[must_use]
    pub fn identity(&self) -> (&str, &str) {
        match self {
            Self::Content(entity) => (entity.entity_id(), entity.entity_definition_id()),
            Self::Deletion(deletion) => (deletion.entity_id(), deletion.entity_definition_id()),
        }
    }
}

/// Driven by the orchestrator one batch at a time. A source is
/// deliberately not a `Stream`: `next_batch` takes the last-committed
/// cursor explicitly so a source implementation cannot accidentally
/// retain cross-call state the orchestrator did not commit.
#[async_trait]
pub trait Source: Send {
    /// Fetch the next batch.
    ///
    /// Returns the batch itself, the cursor to commit if this batch is
    /// applied successfully, and whether this was the final batch (a
    /// full sync uses this to trigger orphan detection).
    ///
    /// # Errors
    /// Propagates any upstream failure as a [`CoreError`]; a transient
    /// failure should be [`CoreError::Upstream`] so the orchestrator can
    /// distinguish it from a data-integrity bug.
    async fn next_batch(
        &mut self,
        cursor: Option<&SyncCursor>,
    ) -> Result<(Vec<RawEntity>, Option<SyncCursor>, bool), CoreError>;

    /// Whether this source run should trigger orphan detection once
    /// exhausted. `true` for a full sync, `false` for an incremental run
    /// or an ARF replay.
    fn is_full_sync(&self) -> bool;
}
