//! The per-request authorization capability passed into every core
//! operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::User;

/// How the caller authenticated. Wire tags match the original platform's
/// `AuthMethod` exactly, not the illustrative names used elsewhere —
/// `api_key` and `internal_system` are the authoritative spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// A background/system process acting without a human user.
    System,
    /// A long-lived API key scoped to one organization.
    ApiKey,
    /// An interactive user session authenticated via Auth0.
    Auth0,
    /// Trusted internal service-to-service call (e.g. billing handler
    /// constructing a system context on an organization's behalf).
    InternalSystem,
}

impl AuthMethod {
    /// The exact wire string for this auth method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::ApiKey => "api_key",
            Self::Auth0 => "auth0",
            Self::InternalSystem => "internal_system",
        }
    }
}

/// The authorization capability carried through every core operation.
///
/// Constructed once at ingress (after context-cache/rate-limiter checks)
/// and passed by reference into orchestrator, resolver, and handler calls.
/// Never cloned across organization boundaries — a single `ApiContext`
/// value is scoped to exactly one `organization_id` for its lifetime.
#[derive(Debug, Clone)]
pub struct ApiContext {
    request_id: Uuid,
    auth_method: AuthMethod,
    organization_id: Uuid,
    user: Option<User>,
}

impl ApiContext {
    /// Build a new context for an authenticated request.
    #[must_use]
    pub fn new(request_id: Uuid, auth_method: AuthMethod, organization_id: Uuid) -> Self {
        Self {
            request_id,
            auth_method,
            organization_id,
            user: None,
        }
    }

    /// Attach the authenticated user, for user-auth requests.
    #[must_use]
    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Build a system context acting on an organization's behalf, mirroring
    /// the internal billing-service pattern: no human user, `InternalSystem`
    /// auth, a fresh request id.
    #[must_use]
    pub fn system(organization_id: Uuid) -> Self {
        Self::new(Uuid::new_v4(), AuthMethod::System, organization_id)
    }

    /// The request id this context was constructed for.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// How the caller authenticated.
    #[must_use]
    pub const fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// The organization this context is scoped to.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// The authenticated user, if this request carries one.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// True when the request authenticated via a long-lived API key.
    #[must_use]
    pub const fn is_api_key_auth(&self) -> bool {
        matches!(self.auth_method, AuthMethod::ApiKey)
    }

    /// True when the request carries an authenticated user identity.
    #[must_use]
    pub const fn is_user_auth(&self) -> bool {
        self.user.is_some()
    }

    /// Check that the attached user's role in this organization meets the
    /// minimum required role. API-key and system auth are always refused
    /// for admin-gated operations, matching the platform's RBAC rule that
    /// administrative mutations require an interactive user session.
    #[must_use]
    pub fn has_role_at_least(&self, minimum: crate::user::Role) -> bool {
        if self.is_api_key_auth() {
            return false;
        }
        self.user
            .as_ref()
            .and_then(|u| u.role_in(self.organization_id))
            .is_some_and(|role| role >= minimum)
    }

    /// A serializable snapshot suitable for handing to an out-of-process
    /// worker (e.g. a workflow payload), mirroring the original's
    /// `to_serializable_dict`.
    #[must_use]
    pub fn to_serializable(&self) -> SerializableContext {
        SerializableContext {
            request_id: self.request_id,
            auth_method: self.auth_method,
            organization_id: self.organization_id,
            user_id: self.user.as_ref().map(User::id),
        }
    }
}

impl std::fmt::Display for ApiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ApiContext(request_id={}, auth_method={}, organization_id={})",
            self.request_id,
            self.auth_method.as_str(),
            self.organization_id
        )
    }
}

/// Wire shape of [`ApiContext`] for cross-process handoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableContext {
    request_id: Uuid,
    auth_method: AuthMethod,
    organization_id: Uuid,
    user_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Role;

    #[test]
    fn auth_method_wire_tags_match_platform() {
        assert_eq!(AuthMethod::System.as_str(), "system");
        assert_eq!(AuthMethod::ApiKey.as_str(), "api_key");
        assert_eq!(AuthMethod::Auth0.as_str(), "auth0");
        assert_eq!(AuthMethod::InternalSystem.as_str(), "internal_system");
    }

    #[test]
    fn api_key_auth_never_satisfies_role_check() {
        let ctx = ApiContext::new(Uuid::new_v4(), AuthMethod::ApiKey, Uuid::new_v4());
        assert!(!ctx.has_role_at_least(Role::Member));
    }

    #[test]
    fn system_context_has_no_user() {
        let org = Uuid::new_v4();
        let ctx = ApiContext::system(org);
        assert!(!ctx.is_user_auth());
        assert_eq!(ctx.organization_id(), org);
    }
}
