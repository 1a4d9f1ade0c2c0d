//! Encryption at rest for integration credentials.
//!
//! Credentials are decrypted on demand and must not be cached in
//! plaintext beyond the duration of one sync job — this crate exposes no
//! caching of its own; callers hold the decrypted bytes only as long as
//! the borrow they take.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use airweave_core::IntegrationCredential;
use airweave_error::CoreError;
use rand::RngCore;
use uuid::Uuid;

const NONCE_LEN: usize = 12;

/// Encrypts and decrypts credential payloads with AES-256-GCM.
///
/// One key per process, matching the platform's secrets-manager
/// deployment (a single KMS-backed data key per environment). The nonce
/// is generated fresh per encryption and stored as a prefix on the
/// ciphertext so decryption needs no out-of-band state.
pub struct SecretsManager {
    cipher: Aes256Gcm,
}

impl SecretsManager {
    /// Build a manager from a 32-byte key, typically resolved from a KMS
    /// or environment secret at process startup.
    #[must_use]
    pub fn new(key_bytes: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt a plaintext credential payload, producing a
    /// `nonce || ciphertext` blob suitable for [`IntegrationCredential::ciphertext`].
    ///
    /// # Errors
    /// Returns [`CoreError::DataIntegrity`] if the underlying AEAD
    /// encryption fails, which should not happen for well-formed input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext =
            self.cipher
                .encrypt(nonce, plaintext)
                .map_err(|_| CoreError::DataIntegrity {
                    message: "credential encryption failed".to_string(),
                })?;

        let mut blob = nonce_bytes.to_vec();
        blob.append(&mut ciphertext);
        Ok(blob)
    }

    /// Decrypt a `nonce || ciphertext` blob back to plaintext.
    ///
    /// # Errors
    /// Returns [`CoreError::DataIntegrity`] if the blob is too short to
    /// contain a nonce, or if AEAD decryption fails (wrong key, tampered
    /// ciphertext).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CoreError> {
        if blob.len() <= NONCE_LEN {
            return Err(CoreError::DataIntegrity {
                message: "credential ciphertext shorter than nonce prefix".to_string(),
            });
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CoreError::DataIntegrity {
                message: "credential decryption failed".to_string(),
            })
    }

    /// Decrypt a credential, refusing to return plaintext if it belongs to
    /// a different organization than the caller expects. This is the
    /// single enforcement point for "never serialized outside the
    /// organization boundary" — every other path to the plaintext goes
    /// through this function.
    ///
    /// # Errors
    /// Returns [`CoreError::Forbidden`] if `credential.organization_id()`
    /// does not match `expected_organization_id`, or propagates
    /// [`CoreError::DataIntegrity`] from [`Self::decrypt`].
    pub fn decrypt_scoped(
        &self,
        credential: &IntegrationCredential,
        expected_organization_id: Uuid,
    ) -> Result<Vec<u8>, CoreError> {
        if credential.organization_id() != expected_organization_id {
            return Err(CoreError::Forbidden {
                message: format!(
                    "credential {} belongs to a different organization",
                    credential.id()
                ),
            });
        }
        self.decrypt(credential.ciphertext())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airweave_core::AuthMethod;

    fn manager() -> SecretsManager {
        SecretsManager::new(&[7u8; 32])
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let manager = manager();
        let plaintext = b"super-secret-token";
        let blob = manager.encrypt(plaintext).unwrap();
        assert_ne!(blob, plaintext);
        let decrypted = manager.decrypt(&blob).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let manager = manager();
        let mut blob = manager.encrypt(b"token").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(manager.decrypt(&blob).is_err());
    }

    #[test]
    fn decrypt_scoped_refuses_cross_organization_access() {
        let manager = manager();
        let owner_org = Uuid::new_v4();
        let blob = manager.encrypt(b"token").unwrap();
        let credential = IntegrationCredential::new(
            Uuid::new_v4(),
            owner_org,
            "github",
            AuthMethod::System,
            blob,
        );
        let err = manager
            .decrypt_scoped(&credential, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden { .. }));
    }

    #[test]
    fn decrypt_scoped_succeeds_for_matching_organization() {
        let manager = manager();
        let org = Uuid::new_v4();
        let blob = manager.encrypt(b"token").unwrap();
        let credential =
            IntegrationCredential::new(Uuid::new_v4(), org, "github", AuthMethod::System, blob);
        let plaintext = manager.decrypt_scoped(&credential, org).unwrap();
        assert_eq!(plaintext, b"token");
    }
}
