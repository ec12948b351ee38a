//! Integrity signatures over stored account records.
//!
//! The server holds one Ed25519 key pair on disk:
//!   <keys_dir>/server_private.pem   PKCS#8
//!   <keys_dir>/server_public.pem    SPKI
//!
//! Every record written to the account store carries a signature over
//! `AccountFields::canonical_bytes`. A record whose signature no longer
//! verifies is treated as tampered and is never used to authenticate.
//!
//! Fail-closed rules:
//!   - `sign` without a private key is a configuration error.
//!   - `verify` without a public key returns false.

use std::path::Path;

use danaid_crypto::hash::identity_fingerprint;
use danaid_crypto::identity::{IdentityKeyPair, IdentityPublicKey};
use danaid_proto::{AccountFields, AccountRecord};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::store::write_atomic;

#[derive(Default)]
pub struct IntegritySigner {
    signing_key: Option<IdentityKeyPair>,
    verifying_key: Option<IdentityPublicKey>,
}

impl IntegritySigner {
    pub fn new(signing_key: Option<IdentityKeyPair>, verifying_key: Option<IdentityPublicKey>) -> Self {
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn from_key_pair(pair: IdentityKeyPair) -> Self {
        let verifying_key = Some(pair.public());
        Self {
            signing_key: Some(pair),
            verifying_key,
        }
    }

    /// Load whichever of the two key files are present and valid. Missing or
    /// unreadable keys are logged and left empty; the failure surfaces when an
    /// operation needs them.
    pub fn load(config: &AuthConfig) -> Self {
        let private_path = config.private_key_path();
        let public_path = config.public_key_path();

        let signing_key = read_key(&private_path, IdentityKeyPair::from_pkcs8_pem);
        let verifying_key = read_key(&public_path, IdentityPublicKey::from_pem);

        if let (Some(pair), Some(public)) = (&signing_key, &verifying_key) {
            if &pair.public() != public {
                tracing::warn!(
                    target: "danaid_auth",
                    event = "server_key_mismatch",
                    private = %private_path.display(),
                    public = %public_path.display(),
                    "server private and public keys do not form a pair",
                );
            }
        }

        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn can_sign(&self) -> bool {
        self.signing_key.is_some()
    }

    pub fn can_verify(&self) -> bool {
        self.verifying_key.is_some()
    }

    pub fn public_key(&self) -> Option<&IdentityPublicKey> {
        self.verifying_key.as_ref()
    }

    pub fn sign(&self, data: &[u8]) -> Result<String, AuthError> {
        let pair = self
            .signing_key
            .as_ref()
            .ok_or_else(|| AuthError::Configuration("server private key not loaded".into()))?;
        Ok(pair.sign_b64(data))
    }

    pub fn verify(&self, data: &[u8], signature_b64: &str) -> bool {
        match &self.verifying_key {
            Some(key) => key.verify_b64(data, signature_b64).is_ok(),
            None => {
                tracing::warn!(
                    target: "danaid_auth",
                    event = "integrity_verify_without_key",
                    "server public key not loaded; treating signature as invalid",
                );
                false
            }
        }
    }

    /// Sign `fields` into a storable record.
    pub fn seal(&self, fields: AccountFields) -> Result<AccountRecord, AuthError> {
        let signature = self.sign(&fields.canonical_bytes()?)?;
        Ok(AccountRecord::from_parts(fields, signature))
    }

    pub fn verify_record(&self, record: &AccountRecord) -> bool {
        match record.fields().canonical_bytes() {
            Ok(bytes) => self.verify(&bytes, record.integrity_signature()),
            Err(_) => false,
        }
    }

    /// Apply `edit` to a copy of the record's fields and re-sign. The
    /// fingerprint is recomputed from the (possibly new) public key and
    /// `updatedAt` is bumped. The username cannot change.
    pub fn amend(
        &self,
        record: &AccountRecord,
        edit: impl FnOnce(&mut AccountFields),
    ) -> Result<AccountRecord, AuthError> {
        let mut fields = record.fields().clone();
        edit(&mut fields);
        if fields.username != record.username() {
            return Err(AuthError::InvalidRequest("username is immutable".into()));
        }
        fields.identity_key_fingerprint = identity_fingerprint(&fields.identity_public_key);
        fields.updated_at = chrono::Utc::now()
            .timestamp_millis()
            .max(record.fields().updated_at + 1);
        self.seal(fields)
    }
}

fn read_key<T>(path: &Path, parse: impl FnOnce(&str) -> Result<T, danaid_crypto::CryptoError>) -> Option<T> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(
                target: "danaid_auth",
                event = "server_key_missing",
                path = %path.display(),
                error = %e,
            );
            return None;
        }
    };
    match parse(&text) {
        Ok(key) => Some(key),
        Err(e) => {
            tracing::warn!(
                target: "danaid_auth",
                event = "server_key_invalid",
                path = %path.display(),
                error = %e,
            );
            None
        }
    }
}

/// Generate a fresh server key pair under `config.keys_dir`. Existing files
/// are only replaced with `force`; replacing the key invalidates every stored
/// record's signature.
pub fn generate_key_files(config: &AuthConfig, force: bool) -> Result<IdentityPublicKey, AuthError> {
    let private_path = config.private_key_path();
    let public_path = config.public_key_path();
    if !force && (private_path.exists() || public_path.exists()) {
        return Err(AuthError::AlreadyExists(format!(
            "server keys in {}",
            config.keys_dir.display()
        )));
    }

    let pair = IdentityKeyPair::generate();
    let private_pem = pair.to_pkcs8_pem()?;
    let public_pem = pair.public_pem()?;

    write_atomic(&private_path, private_pem.as_bytes())?;
    restrict_permissions(&private_path);
    write_atomic(&public_path, public_pem.as_bytes())?;

    tracing::info!(
        target: "danaid_auth",
        event = "server_keys_generated",
        keys_dir = %config.keys_dir.display(),
        fingerprint = %identity_fingerprint(&public_pem),
    );
    Ok(pair.public())
}

#[cfg(unix)]
pub(crate) fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(target: "danaid_auth", event = "chmod_failed", path = %path.display(), error = %e);
    }
}

#[cfg(not(unix))]
pub(crate) fn restrict_permissions(_path: &Path) {}
