//! Entities: the smallest transported unit, its polymorphic content
//! shapes, and the persistent records used for action resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four processing requirements a destination can declare. The
/// destination handler picks the matching chunker/embedder pipeline for
/// each; "dense only" destinations still receive chunks, the sparse
/// embedder is just bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingRequirement {
    /// Full pipeline: chunking plus dense and sparse embeddings.
    ChunksAndEmbeddings,
    /// Chunking plus dense embeddings only.
    ChunksAndEmbeddingsDenseOnly,
    /// Raw text, no embeddings (e.g. a full-text search destination).
    TextOnly,
    /// No processing; the destination stores entities verbatim.
    Raw,
}

impl ProcessingRequirement {
    /// The exact wire string for this requirement.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChunksAndEmbeddings => "chunks_and_embeddings",
            Self::ChunksAndEmbeddingsDenseOnly => "chunks_and_embeddings_dense_only",
            Self::TextOnly => "text_only",
            Self::Raw => "raw",
        }
    }

    /// Whether a destination with this requirement wants a sparse
    /// embedding alongside the dense one.
    #[must_use]
    pub const fn wants_sparse_embedding(self) -> bool {
        matches!(self, Self::ChunksAndEmbeddings)
    }

    /// Whether a destination with this requirement wants chunking at all.
    #[must_use]
    pub const fn wants_chunking(self) -> bool {
        matches!(
            self,
            Self::ChunksAndEmbeddings | Self::ChunksAndEmbeddingsDenseOnly
        )
    }
}

/// The closed set of content shapes an `Entity` may carry. The runtime
/// dispatches on this tag at a single point in the resolver and the
/// destination handler — no other module matches on entity shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum EntityShape {
    /// A pre-chunked text fragment ready for embedding.
    Chunk {
        /// The chunk's raw text content.
        text: String,
    },
    /// A file reference with optional extracted text content.
    File {
        /// Original filename.
        filename: String,
        /// MIME type, if known.
        mime_type: Option<String>,
        /// Extracted text, if the source performed extraction.
        extracted_text: Option<String>,
    },
    /// A web page capture.
    Web {
        /// Source URL.
        url: String,
        /// Page title, if extracted.
        title: Option<String>,
        /// Extracted body text.
        body_text: String,
    },
    /// A source code file.
    Code {
        /// Repository-relative path.
        path: String,
        /// Detected language, if known.
        language: Option<String>,
        /// File content.
        content: String,
    },
    /// An email message.
    Email {
        /// Sender address.
        from: String,
        /// Subject line.
        subject: String,
        /// Plain-text body.
        body_text: String,
    },
}

/// Identity keys shared by every entity shape plus a deletion marker.
/// `(entity_id, entity_definition_id)` is the fingerprint an
/// `EntityRecord` is keyed on, scoped additionally by `sync_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetadata {
    /// The sync run that produced this entity.
    pub sync_id: Uuid,
    /// The collection this entity's sync feeds.
    pub collection_id: Uuid,
    /// Discriminator for which `EntityShape` variant this entity carries;
    /// kept alongside the shape's own serde tag for quick filtering
    /// without deserializing the shape payload.
    pub shape_tag: &'static str,
    /// True if this record is a deletion marker rather than content.
    pub deleted: bool,
}

/// The smallest unit processed by the sync pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    entity_id: String,
    entity_definition_id: String,
    hash: String,
    shape: EntityShape,
    updated_at: DateTime<Utc>,
    metadata: SystemMetadata,
}

impl Entity {
    /// Build an entity. `hash` must already be a stable function of the
    /// shape's embeddable fields — computing it is a source concern, out
    /// of scope here.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        entity_definition_id: impl Into<String>,
        hash: impl Into<String>,
        shape: EntityShape,
        updated_at: DateTime<Utc>,
        metadata: SystemMetadata,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_definition_id: entity_definition_id.into(),
            hash: hash.into(),
            shape,
            updated_at,
            metadata,
        }
    }

    /// Stable source-provided identifier.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The entity's type, as defined by the source.
    #[must_use]
    pub fn entity_definition_id(&self) -> &str {
        &self.entity_definition_id
    }

    /// Content hash, stable over the embeddable fields.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// The polymorphic content payload.
    #[must_use]
    pub const fn shape(&self) -> &EntityShape {
        &self.shape
    }

    /// When the source last updated this entity.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The airweave-system-metadata envelope.
    #[must_use]
    pub const fn metadata(&self) -> &SystemMetadata {
        &self.metadata
    }

    /// The `(sync_id, entity_id, entity_definition_id)` fingerprint used as
    /// the `EntityRecord` key.
    #[must_use]
    pub fn fingerprint(&self) -> (Uuid, String, String) {
        (
            self.metadata.sync_id,
            self.entity_id.clone(),
            self.entity_definition_id.clone(),
        )
    }
}

/// A source-emitted marker that a previously-seen entity has been removed
/// upstream. Carries the same identity keys as the entity it replaces, no
/// content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionEntity {
    entity_id: String,
    entity_definition_id: String,
    metadata: SystemMetadata,
}

impl DeletionEntity {
    /// Build a deletion marker.
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        entity_definition_id: impl Into<String>,
        metadata: SystemMetadata,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_definition_id: entity_definition_id.into(),
            metadata,
        }
    }

    /// The identifier of the entity being deleted.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The type of the entity being deleted.
    #[must_use]
    pub fn entity_definition_id(&self) -> &str {
        &self.entity_definition_id
    }

    /// The airweave-system-metadata envelope.
    #[must_use]
    pub const fn metadata(&self) -> &SystemMetadata {
        &self.metadata
    }

    /// The `(sync_id, entity_id, entity_definition_id)` fingerprint used to
    /// look up the stored `EntityRecord`, if any.
    #[must_use]
    pub fn fingerprint(&self) -> (Uuid, String, String) {
        (
            self.metadata.sync_id,
            self.entity_id.clone(),
            self.entity_definition_id.clone(),
        )
    }
}

/// Persistent, per-sync mapping `(sync_id, entity_id, entity_definition_id)
/// -> {hash, last_seen_job_id}`, consulted by the action resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    /// The owning sync.
    pub sync_id: Uuid,
    /// Source-provided entity id.
    pub entity_id: String,
    /// Source-provided entity type.
    pub entity_definition_id: String,
    /// Content hash as of the last write.
    pub hash: String,
    /// The job that last wrote or touched this record. Used by orphan
    /// detection: records whose `last_seen_job_id` is older than the
    /// current job are deleted at the end of a full sync.
    pub last_seen_job_id: Uuid,
}

/// Persistent, per-collection mapping enabling dedup across multiple
/// source connections feeding the same collection. Keyed additionally by
/// `organization_id` so dedup can never cross a tenant boundary even if a
/// `collection_id` were somehow reused — enforced at the type level here,
/// not left to caller discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionEntityRecord {
    /// Tenant boundary; part of the dedup key alongside `collection_id`.
    pub organization_id: Uuid,
    /// The owning collection.
    pub collection_id: Uuid,
    /// Source-provided entity id.
    pub entity_id: String,
    /// Source-provided entity type.
    pub entity_definition_id: String,
    /// Content hash as of the last write.
    pub hash: String,
    /// The source connection that currently "owns" this entity for dedup
    /// purposes — later writers with the same identity lose the conflict
    /// and resolve to Keep without re-emitting.
    pub owning_source_connection_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(sync_id: Uuid, collection_id: Uuid) -> SystemMetadata {
        SystemMetadata {
            sync_id,
            collection_id,
            shape_tag: "chunk",
            deleted: false,
        }
    }

    #[test]
    fn fingerprint_matches_identity_keys() {
        let sync_id = Uuid::new_v4();
        let collection_id = Uuid::new_v4();
        let entity = Entity::new(
            "e1",
            "def1",
            "h1",
            EntityShape::Chunk { text: "hello".to_string() },
            Utc::now(),
            meta(sync_id, collection_id),
        );
        let (s, id, def) = entity.fingerprint();
        assert_eq!(s, sync_id);
        assert_eq!(id, "e1");
        assert_eq!(def, "def1");
    }

    #[test]
    fn processing_requirement_wire_tags() {
        assert_eq!(
            ProcessingRequirement::ChunksAndEmbeddings.as_str(),
            "chunks_and_embeddings"
        );
        assert_eq!(
            ProcessingRequirement::ChunksAndEmbeddingsDenseOnly.as_str(),
            "chunks_and_embeddings_dense_only"
        );
        assert_eq!(ProcessingRequirement::TextOnly.as_str(), "text_only");
        assert_eq!(ProcessingRequirement::Raw.as_str(), "raw");
    }

    #[test]
    fn dense_only_skips_sparse_but_wants_chunks() {
        let req = ProcessingRequirement::ChunksAndEmbeddingsDenseOnly;
        assert!(req.wants_chunking());
        assert!(!req.wants_sparse_embedding());
    }
}
