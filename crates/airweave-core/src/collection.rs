//! Collections: logical groupings of source connections.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a collection, from `core/shared_models.py` in the
/// original platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Accepting new source connections and sync runs.
    Active,
    /// Paused: existing data retained, no new runs scheduled.
    Inactive,
    /// Soft-deleted; retained for audit only.
    Deleted,
}

/// The embedding configuration a collection locks in at creation.
///
/// `vector_size` is immutable after the first entity is written for this
/// collection — enforced by callers, not representable as a type-level
/// constraint here since the check depends on write history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Name of the embedding model (e.g. `"text-embedding-3-small"`).
    pub model_name: String,
    /// Dimensionality of the dense vector produced by that model.
    pub vector_size: u32,
}

/// Logical grouping of source connections under one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    id: Uuid,
    organization_id: Uuid,
    readable_id: String,
    embedding_config: EmbeddingConfig,
    status: CollectionStatus,
}

impl Collection {
    /// Build a new, active collection.
    #[must_use]
    pub fn new(
        id: Uuid,
        organization_id: Uuid,
        readable_id: impl Into<String>,
        embedding_config: EmbeddingConfig,
    ) -> Self {
        Self {
            id,
            organization_id,
            readable_id: readable_id.into(),
            embedding_config,
            status: CollectionStatus::Active,
        }
    }

    /// This collection's id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// Human-readable slug.
    #[must_use]
    pub fn readable_id(&self) -> &str {
        &self.readable_id
    }

    /// The embedding configuration this collection was created with.
    #[must_use]
    pub const fn embedding_config(&self) -> &EmbeddingConfig {
        &self.embedding_config
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> CollectionStatus {
        self.status
    }

    /// Transition the collection's lifecycle status.
    pub fn set_status(&mut self, status: CollectionStatus) {
        self.status = status;
    }
}
