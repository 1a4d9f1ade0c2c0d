//! Source connections: bindings of a source kind and credentials to a
//! collection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connectivity status of the underlying source kind's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Credentials are valid and usable.
    Connected,
    /// Credentials have expired or been revoked upstream.
    Expired,
    /// Connection has not completed its OAuth/setup handshake.
    Pending,
}

/// Lifecycle status of the source connection record itself, independent of
/// [`ConnectionStatus`] (which tracks the credential, not the record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConnectionStatus {
    /// Active and eligible for scheduled or manual sync runs.
    Active,
    /// Disabled by an admin; no runs scheduled.
    Inactive,
    /// Soft-deleted; retained for audit only.
    Deleted,
}

/// Binds a source kind (e.g. `"github"`) and its credential to a
/// collection. Owns exactly one [`crate::sync::Sync`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConnection {
    id: Uuid,
    organization_id: Uuid,
    collection_id: Uuid,
    source_kind: String,
    credential_id: Uuid,
    connection_status: ConnectionStatus,
    status: SourceConnectionStatus,
    sync_id: Uuid,
}

impl SourceConnection {
    /// Build a new source connection, already bound to its owned sync.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        id: Uuid,
        organization_id: Uuid,
        collection_id: Uuid,
        source_kind: String,
        credential_id: Uuid,
        sync_id: Uuid,
    ) -> Self {
        Self {
            id,
            organization_id,
            collection_id,
            source_kind,
            credential_id,
            connection_status: ConnectionStatus::Pending,
            status: SourceConnectionStatus::Active,
            sync_id,
        }
    }

    /// This connection's id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// The collection this connection feeds.
    #[must_use]
    pub const fn collection_id(&self) -> Uuid {
        self.collection_id
    }

    /// Which source implementation this connection binds (e.g. `"github"`).
    #[must_use]
    pub fn source_kind(&self) -> &str {
        &self.source_kind
    }

    /// The credential this connection authenticates with.
    #[must_use]
    pub const fn credential_id(&self) -> Uuid {
        self.credential_id
    }

    /// The sync this connection exclusively owns.
    #[must_use]
    pub const fn sync_id(&self) -> Uuid {
        self.sync_id
    }

    /// Current credential connectivity status.
    #[must_use]
    pub const fn connection_status(&self) -> ConnectionStatus {
        self.connection_status
    }

    /// Update the credential connectivity status.
    pub fn set_connection_status(&mut self, status: ConnectionStatus) {
        self.connection_status = status;
    }

    /// Current record lifecycle status.
    #[must_use]
    pub const fn status(&self) -> SourceConnectionStatus {
        self.status
    }

    /// Update the record lifecycle status.
    pub fn set_status(&mut self, status: SourceConnectionStatus) {
        self.status = status;
    }
}
