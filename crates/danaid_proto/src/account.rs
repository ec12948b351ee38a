//! Account record as persisted by the server.
//!
//! The record is split into the signed field set (`AccountFields`) and the
//! server's integrity signature over it. On disk both are flattened into one
//! JSON object:
//!
//! ```json
//! {
//!   "username": "alice",
//!   "passwordDerivedKey": "<base64>",
//!   "identityPublicKey": "-----BEGIN PUBLIC KEY-----\n...",
//!   "identityKeyFingerprint": "<hex sha-256 of the PEM>",
//!   "prekeyBundle": { ... },            // only when one was registered
//!   "createdAt": 1700000000000,
//!   "updatedAt": 1700000000000,
//!   "integritySignature": "<base64>"
//! }
//! ```

use serde::{Deserialize, Serialize};

use danaid_crypto::codec::b64_decode;

use crate::error::ProtoError;
use crate::prekey::PrekeyBundle;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;

/// 3–32 characters of `[A-Za-z0-9_]`.
pub fn validate_username(username: &str) -> Result<(), ProtoError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ProtoError::InvalidUsername(format!(
            "length {len} outside {USERNAME_MIN_LEN}..={USERNAME_MAX_LEN}"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ProtoError::InvalidUsername(
            "only letters, digits and '_' are allowed".into(),
        ));
    }
    Ok(())
}

/// Every field covered by the integrity signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFields {
    pub username: String,
    /// Base64 of the client's password-derived key.
    pub password_derived_key: String,
    /// Identity public key, PEM text.
    pub identity_public_key: String,
    pub identity_key_fingerprint: String,
    /// Absent from the JSON when no bundle was registered, so records
    /// without one keep their signed bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prekey_bundle: Option<PrekeyBundle>,
    /// Unix millis.
    pub created_at: i64,
    /// Unix millis; bumped on every re-sign.
    pub updated_at: i64,
}

impl AccountFields {
    /// Bytes the integrity signature is computed over: compact JSON in
    /// declaration order. Signer and verifier must both go through here.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn password_derived_key_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        b64_decode(&self.password_derived_key).map_err(|e| ProtoError::InvalidField {
            field: "passwordDerivedKey",
            reason: e.to_string(),
        })
    }
}

/// Signed account record. Construct through the server's integrity signer;
/// `from_parts` exists for storage layers and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(flatten)]
    fields: AccountFields,
    integrity_signature: String,
}

impl AccountRecord {
    pub fn from_parts(fields: AccountFields, integrity_signature: String) -> Self {
        Self {
            fields,
            integrity_signature,
        }
    }

    pub fn fields(&self) -> &AccountFields {
        &self.fields
    }

    pub fn integrity_signature(&self) -> &str {
        &self.integrity_signature
    }

    pub fn username(&self) -> &str {
        &self.fields.username
    }

    pub fn identity_public_key(&self) -> &str {
        &self.fields.identity_public_key
    }

    pub fn identity_key_fingerprint(&self) -> &str {
        &self.fields.identity_key_fingerprint
    }

    pub fn prekey_bundle(&self) -> Option<&PrekeyBundle> {
        self.fields.prekey_bundle.as_ref()
    }

    pub fn into_parts(self) -> (AccountFields, String) {
        (self.fields, self.integrity_signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> AccountFields {
        AccountFields {
            username: "alice".into(),
            password_derived_key: "AAECAwQFBgcICQoLDA0ODw==".into(),
            identity_public_key: "-----BEGIN PUBLIC KEY-----\nX\n-----END PUBLIC KEY-----\n".into(),
            identity_key_fingerprint: "ab".repeat(32),
            prekey_bundle: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username(&"a".repeat(32)).is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("al ice").is_err());
        assert!(validate_username("alice!").is_err());
        assert!(validate_username("żółw").is_err());
    }

    #[test]
    fn canonical_bytes_have_fixed_field_order() {
        let bytes = fields().canonical_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"username":"alice","passwordDerivedKey":"#));
        assert!(text.ends_with(r#""createdAt":1700000000000,"updatedAt":1700000000000}"#));
        assert!(!text.contains("integritySignature"));
    }

    #[test]
    fn record_json_is_flat() {
        let record = AccountRecord::from_parts(fields(), "c2ln".into());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["username"], "alice");
        assert_eq!(value["integritySignature"], "c2ln");

        let back: AccountRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn any_field_change_changes_canonical_bytes() {
        let base = fields().canonical_bytes().unwrap();
        let mut changed = fields();
        changed.updated_at += 1;
        assert_ne!(changed.canonical_bytes().unwrap(), base);
    }

    #[test]
    fn prekey_bundle_is_signed_only_when_present() {
        let without = String::from_utf8(fields().canonical_bytes().unwrap()).unwrap();
        assert!(!without.contains("prekeyBundle"));

        let mut with = fields();
        with.prekey_bundle = Some(PrekeyBundle {
            signed_pre_key_pub: "spk".into(),
            signed_pre_key_signature: "c2ln".into(),
            one_time_pre_keys: Vec::new(),
        });
        let text = String::from_utf8(with.canonical_bytes().unwrap()).unwrap();
        assert!(text.contains(r#""prekeyBundle":{"signedPreKeyPub":"spk""#));

        let record = AccountRecord::from_parts(with, "c2ln".into());
        let back: AccountRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(back.prekey_bundle().map(|b| b.signed_pre_key_pub.as_str()), Some("spk"));
    }

    #[test]
    fn derived_key_must_be_base64() {
        assert_eq!(fields().password_derived_key_bytes().unwrap(), (0u8..16).collect::<Vec<_>>());
        let mut bad = fields();
        bad.password_derived_key = "***".into();
        assert!(matches!(
            bad.password_derived_key_bytes(),
            Err(ProtoError::InvalidField { field: "passwordDerivedKey", .. })
        ));
    }
}
