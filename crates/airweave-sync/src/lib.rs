//! Sync execution engine: resolves raw source output into dispatchable
//! actions, fans them out to destinations and archival storage, tracks
//! per-job progress, and drives the job state machine end to end.
//!
//! Grounded on this specification's §4.6–§4.10 component design; no
//! single teacher module covers this pipeline, so its shape is original
//! while its idioms (trait-object collaborators threaded by reference,
//! `async_trait` boundaries, `thiserror`-backed `CoreError` propagation)
//! follow the rest of this workspace.

pub mod action;
pub mod cancellation;
pub mod cursor;
pub mod dispatcher;
pub mod handlers;
pub mod orchestrator;
pub mod replay;
pub mod resolver;
pub mod source;
pub mod tracker;

pub mod testing;

pub use action::{handler_names, BatchAction, EntityActionBatch, ResolvedAction};
pub use cancellation::CancellationToken;
pub use cursor::SyncCursor;
pub use dispatcher::{ActionDispatcher, DisabledHandlers};
pub use handlers::{ArfHandler, ArfStore, DestinationClient, DestinationHandler, EntityPostgresHandler};
pub use orchestrator::SyncOrchestrator;
pub use replay::{begin_fork, complete_fork, ArfReplaySource};
pub use resolver::{EntityActionResolver, EntityRecordStore, ResolverConfig};
pub use source::{RawEntity, Source};
pub use tracker::{BatchCounts, EntityTracker};
