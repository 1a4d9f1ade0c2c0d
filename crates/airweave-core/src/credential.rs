//! Integration credentials: encrypted secrets bound to a source kind.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::AuthMethod;

/// An encrypted credential blob plus its auth method tag. The ciphertext
/// is opaque here; `airweave-secrets` owns encryption/decryption. Never
/// serialized outside the organization boundary — there is deliberately
/// no `Clone` impl that would let a value cross an `ApiContext` scope
/// undetected; callers construct a fresh value per organization.
#[derive(Debug, Serialize, Deserialize)]
pub struct IntegrationCredential {
    id: Uuid,
    organization_id: Uuid,
    source_kind: String,
    auth_method: AuthMethod,
    ciphertext: Vec<u8>,
}

impl IntegrationCredential {
    /// Build a credential from an already-encrypted blob.
    #[must_use]
    pub fn new(
        id: Uuid,
        organization_id: Uuid,
        source_kind: impl Into<String>,
        auth_method: AuthMethod,
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            id,
            organization_id,
            source_kind: source_kind.into(),
            auth_method,
            ciphertext,
        }
    }

    /// This credential's id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Owning organization.
    #[must_use]
    pub const fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    /// Which source implementation this credential authenticates.
    #[must_use]
    pub fn source_kind(&self) -> &str {
        &self.source_kind
    }

    /// How this credential was obtained.
    #[must_use]
    pub const fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// The encrypted payload. Only `airweave-secrets` should ever
    /// decrypt this.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}
