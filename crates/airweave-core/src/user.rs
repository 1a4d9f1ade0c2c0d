//! Users and their organization memberships.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered membership role. Derives `Ord` so callers can compare directly:
/// `role >= Role::Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Base membership: read and use, no administrative actions.
    Member,
    /// Can manage collections, source connections, and syncs.
    Admin,
    /// Full control, including membership and billing changes.
    Owner,
}

/// A user's role within a single organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    organization_id: Uuid,
    role: Role,
}

impl Membership {
    /// Build a membership record.
    #[must_use]
    pub const fn new(organization_id: Uuid, role: Role) -> Self {
        Self {
            organization_id,
            role,
        }
    }

    /// Organization this membership grants access to.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// The granted role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}

/// An optional actor: identified by email and an external identity id
/// (e.g. an Auth0 subject), linked to zero or more organizations.
///
/// User and Organization hold ids of each other's memberships rather than
/// owning references in both directions — membership is resolved by
/// explicit lookup, never a mutual `Rc`/`Arc` cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: Uuid,
    email: String,
    external_identity_id: String,
    memberships: Vec<Membership>,
}

impl User {
    /// Build a user with no memberships yet.
    #[must_use]
    pub fn new(id: Uuid, email: impl Into<String>, external_identity_id: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            external_identity_id: external_identity_id.into(),
            memberships: Vec::new(),
        }
    }

    /// This user's stable id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The user's email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The external identity provider's subject id for this user.
    #[must_use]
    pub fn external_identity_id(&self) -> &str {
        &self.external_identity_id
    }

    /// All organizations this user belongs to.
    #[must_use]
    pub fn memberships(&self) -> &[Membership] {
        &self.memberships
    }

    /// Add or replace the membership for an organization.
    pub fn set_membership(&mut self, organization_id: Uuid, role: Role) {
        if let Some(existing) = self
            .memberships
            .iter_mut()
            .find(|m| m.organization_id == organization_id)
        {
            existing.role = role;
        } else {
            self.memberships.push(Membership::new(organization_id, role));
        }
    }

    /// This user's role in a given organization, if they are a member.
    #[must_use]
    pub fn role_in(&self, organization_id: Uuid) -> Option<Role> {
        self.memberships
            .iter()
            .find(|m| m.organization_id == organization_id)
            .map(Membership::role)
    }
}
