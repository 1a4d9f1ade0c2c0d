//! Domain model shared by every crate in the airweave sync core.
//!
//! This crate carries no I/O of its own. It defines the tenant-scoped
//! entities the rest of the workspace operates on (`Organization`, `User`,
//! `Collection`, `Sync`, `Entity`, ...), the `ApiContext` capability threaded
//! through every core operation, and the `DomainEvent` family published on
//! the event bus.

pub mod collection;
pub mod config;
pub mod context;
pub mod credential;
pub mod entity;
pub mod events;
pub mod logging;
pub mod organization;
pub mod source_connection;
pub mod sync;
pub mod usage;
pub mod user;

pub use collection::{Collection, CollectionStatus, EmbeddingConfig};
pub use config::{ConfigError, RuntimeConfig};
pub use context::{ApiContext, AuthMethod};
pub use credential::IntegrationCredential;
pub use entity::{
    DeletionEntity, Entity, EntityRecord, EntityShape, CollectionEntityRecord,
    ProcessingRequirement, SystemMetadata,
};
pub use events::DomainEvent;
pub use logging::RequestLogger;
pub use organization::{BillingPlan, FeatureFlag, Organization};
pub use source_connection::{ConnectionStatus, SourceConnection, SourceConnectionStatus};
pub use sync::{
    DestinationRole, ExecutionConfig, Sync, SyncConnection, SyncJob, SyncJobStatus, SyncStatus,
};
pub use usage::{ActionType, UsageLedger};
pub use user::{Membership, Role, User};
