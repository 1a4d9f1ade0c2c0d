//! The resolver's output: one `ResolvedAction` per input entity, each
//! wrapped with the set of content handlers it must skip.

use airweave_core::Entity;

/// Stable names the dispatcher matches `skip_content_handlers` against.
pub mod handler_names {
    /// [`crate::handlers::DestinationHandler`].
    pub const DESTINATION: &str = "destination";
    /// [`crate::handlers::ArfHandler`].
    pub const ARF: &str = "arf";
    /// [`crate::handlers::EntityPostgresHandler`].
    pub const ENTITY_POSTGRES: &str = "entity_postgres";
}

/// What the resolver decided for one input entity. See spec's action
/// table: `DeletionEntity` present -> Delete, `DeletionEntity` absent ->
/// dropped before this point (no-op), content with no stored record ->
/// Insert, content whose hash changed -> Update, content whose hash
/// matches -> Keep.
#[derive(Debug, Clone)]
pub enum ResolvedAction {
    /// No stored record existed for this identity.
    Insert(Entity),
    /// A stored record existed with a different hash. Carries the prior
    /// hash for handlers that want to diff.
    Update { entity: Entity, prior_hash: String },
    /// A stored record existed and matched. Handlers still bump
    /// `last_seen_job_id`, no content write needed.
    Keep(Entity),
    /// A deletion marker matched a stored record.
    Delete {
        /// The identity being removed.
        entity_id: String,
        /// The identity being removed.
        entity_definition_id: String,
    },
}

impl ResolvedAction {
    /// A stable ordering key: Delete, Update, Insert, Keep, matching the
    /// dispatcher's fixed per-kind ordering.
    #[must_use]
    pub const fn dispatch_rank(&self) -> u8 {
        match self {
            Self::Delete { .. } => 0,
            Self::Update { .. } => 1,
            Self::Insert(_) => 2,
            Self::Keep(_) => 3,
        }
    }

    /// The identity pair this action concerns.
    #[must_use]
    pub fn identity(&self) -> (&str, &str) {
        match self {
            Self::Insert(entity) | Self::Keep(entity) => {
                (entity.entity_id(), entity.entity_definition_id())
            }
            Self::Update { entity, .. } => (entity.entity_id(), entity.entity_definition_id()),
            Self::Delete {
                entity_id,
                entity_definition_id,
            } => (entity_id, entity_definition_id),
        }
    }
}

/// One resolved action plus the content handlers it must not be
/// dispatched to. Finer-grained than a single batch-wide set: a
/// collection-dedup loser inside an otherwise-ordinary batch needs its
/// own skip set while its batch-mates proceed normally.
#[derive(Debug, Clone)]
pub struct BatchAction {
    /// The resolved action.
    pub action: ResolvedAction,
    /// Handler names to exclude when dispatching this single action.
    pub skip_content_handlers: std::collections::HashSet<&'static str>,
}

impl BatchAction {
    /// Wrap an action with no handlers skipped.
    #[must_use]
    pub fn new(action: ResolvedAction) -> Self {
        Self {
            action,
            skip_content_handlers: std::collections::HashSet::new(),
        }
    }

    /// Wrap an action, skipping the named handlers.
    #[must_use]
    pub fn skipping(action: ResolvedAction, handlers: &[&'static str]) -> Self {
        Self {
            action,
            skip_content_handlers: handlers.iter().copied().collect(),
        }
    }
}

/// A fully resolved batch, ready for the dispatcher. Actions are stored
/// in resolver-emitted order; the dispatcher re-sorts by
/// [`ResolvedAction::dispatch_rank`] using a stable sort so within-kind
/// order survives.
#[derive(Debug, Clone, Default)]
pub struct EntityActionBatch {
    /// The resolved actions, in resolver order.
    pub actions: Vec<BatchAction>,
}

impl EntityActionBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions sorted Delete, Update, Insert, Keep, stable within a kind.
    #[must_use]
    pub fn dispatch_order(&self) -> Vec<&BatchAction> {
        let mut ordered: Vec<&BatchAction> = self.actions.iter().collect();
        ordered.sort_by_key(|a| a.action.dispatch_rank());
        ordered
    }
}
