//! Dispatches a resolved batch to the three content handlers in fixed
//! order, honoring per-action and per-job handler exclusions.

use std::collections::HashSet;

use airweave_error::CoreError;

use crate::action::{handler_names, EntityActionBatch};
use crate::handlers::{ArfHandler, DestinationHandler, EntityPostgresHandler};
use crate::tracker::BatchCounts;

/// Handler names disabled for an entire job, layered on top of each
/// action's own `skip_content_handlers`.
#[derive(Debug, Clone, Default)]
pub struct DisabledHandlers(pub HashSet<String>);

/// Runs a resolved batch through `DestinationHandler`, `ArfHandler`, and
/// `EntityPostgresHandler` in that order, for each action in turn.
pub struct ActionDispatcher<'a> {
    destination: &'a DestinationHandler,
    arf: &'a ArfHandler,
    entity_postgres: &'a EntityPostgresHandler<'a>,
    job_disabled: &'a DisabledHandlers,
}

impl<'a> ActionDispatcher<'a> {
    /// Build a dispatcher over the three handlers for one job.
    #[must_use]
    pub fn new(
        destination: &'a DestinationHandler,
        arf: &'a ArfHandler,
        entity_postgres: &'a EntityPostgresHandler<'a>,
        job_disabled: &'a DisabledHandlers,
    ) -> Self {
        Self {
            destination,
            arf,
            entity_postgres,
            job_disabled,
        }
    }

    /// Dispatch every action in the batch, Delete before Update before
    /// Insert before Keep, preserving resolver order within a kind.
    ///
    /// # Errors
    /// Aborts and returns the first active-destination failure. Actions
    /// already applied before the failing one are not rolled back — the
    /// cursor governing re-delivery is the caller's concern.
    pub async fn dispatch(&self, batch: &EntityActionBatch) -> Result<BatchCounts, CoreError> {
        let mut counts = BatchCounts::default();
        for entry in batch.dispatch_order() {
            let skip_destination = self.is_skipped(handler_names::DESTINATION, &entry.skip_content_handlers);
            let skip_arf = self.is_skipped(handler_names::ARF, &entry.skip_content_handlers);
            let skip_entity_postgres =
                self.is_skipped(handler_names::ENTITY_POSTGRES, &entry.skip_content_handlers);

            if !skip_destination {
                self.destination.apply_one(&entry.action).await?;
            }
            if !skip_arf {
                self.arf.apply_one(&entry.action).await;
            }
            if !skip_entity_postgres {
                self.entity_postgres.apply_one(&entry.action).await?;
            }

            counts.record(&entry.action);
        }
        Ok(counts)
    }

    fn is_skipped(&self, handler: &'static str, per_action: &HashSet<&'static str>) -> bool {
        per_action.contains(handler) || self.job_disabled.0.contains(handler)
    }
}
