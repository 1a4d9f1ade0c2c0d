//! In-memory per-job counters, bumped once per dispatched action and
//! folded into `entity.batch_processed` events and the final job
//! summary.

use std::collections::HashMap;

use crate::action::ResolvedAction;

/// Counts produced by dispatching a single batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchCounts {
    /// Entities inserted.
    pub inserted: u64,
    /// Entities updated.
    pub updated: u64,
    /// Entities deleted.
    pub deleted: u64,
    /// Entities left unchanged.
    pub kept: u64,
}

impl BatchCounts {
    /// Bump the counter matching `action`'s kind.
    pub fn record(&mut self, action: &ResolvedAction) {
        match action {
            ResolvedAction::Insert(_) => self.inserted += 1,
            ResolvedAction::Update { .. } => self.updated += 1,
            ResolvedAction::Delete { .. } => self.deleted += 1,
            ResolvedAction::Keep(_) => self.kept += 1,
        }
    }

    /// Total actions counted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.inserted + self.updated + self.deleted + self.kept
    }
}

/// Accumulates [`BatchCounts`] across every batch of one job, broken
/// down by `entity_definition_id` as well as kept as a running total.
#[derive(Debug, Clone, Default)]
pub struct EntityTracker {
    total: BatchCounts,
    by_entity_type: HashMap<String, BatchCounts>,
}

impl EntityTracker {
    /// Build an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch's counts into the running totals.
    pub fn record_batch(&mut self, batch: &crate::action::EntityActionBatch) {
        for entry in &batch.actions {
            self.total.record(&entry.action);
            let (_, entity_definition_id) = entry.action.identity();
            self.by_entity_type
                .entry(entity_definition_id.to_string())
                .or_default()
                .record(&entry.action);
        }
    }

    /// The running total across every batch recorded so far.
    #[must_use]
    pub const fn total(&self) -> BatchCounts {
        self.total
    }

    /// Per-entity-type breakdown, for diagnostics.
    #[must_use]
    pub fn by_entity_type(&self) -> &HashMap<String, BatchCounts> {
        &self.by_entity_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{BatchAction, EntityActionBatch};
    use airweave_core::{Entity, EntityShape, SystemMetadata};
    use chrono::Utc;
    use uuid::Uuid;

    fn entity(id: &str, def: &str) -> Entity {
        Entity::new(
            id,
            def,
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

    #[test]
    fn tracker_accumulates_across_batches() {
        let mut tracker = EntityTracker::new();
        let mut batch_one = EntityActionBatch::new();
        batch_one
            .actions
            .push(BatchAction::new(ResolvedAction::Insert(entity("e1", "doc"))));
        tracker.record_batch(&batch_one);

        let mut batch_two = EntityActionBatch::new();
        batch_two
            .actions
            .push(BatchAction::new(ResolvedAction::Keep(entity("e1", "doc"))));
        batch_two
            .actions
            .push(BatchAction::new(ResolvedAction::Insert(entity("e2", "page"))));
        tracker.record_batch(&batch_two);

        assert_eq!(tracker.total().inserted, 2);
        assert_eq!(tracker.total().kept, 1);
        assert_eq!(tracker.by_entity_type()["doc"].inserted, 1);
        assert_eq!(tracker.by_entity_type()["page"].inserted, 1);
    }
}
