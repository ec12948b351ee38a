//! Prekey bundle a client may publish at registration.
//!
//! The server does not interpret the keys. It only checks the bundle's shape
//! and that `signedPreKeySignature` is the identity key's signature over the
//! `signedPreKeyPub` text. The bundle is then stored inside the signed
//! account fields.
//!
//! ```json
//! {
//!   "signedPreKeyPub": "<text>",
//!   "signedPreKeySignature": "<base64>",
//!   "oneTimePreKeys": [ { "id": 1, "pub": "<text>" } ]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimePreKey {
    pub id: u32,
    #[serde(rename = "pub")]
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrekeyBundle {
    pub signed_pre_key_pub: String,
    /// Identity-key signature over `signed_pre_key_pub` as UTF-8 text.
    pub signed_pre_key_signature: String,
    #[serde(default)]
    pub one_time_pre_keys: Vec<OneTimePreKey>,
}

impl PrekeyBundle {
    /// Bytes `signed_pre_key_signature` covers.
    pub fn signed_bytes(&self) -> &[u8] {
        self.signed_pre_key_pub.as_bytes()
    }

    /// Shape checks only. The signature is checked by whoever holds the
    /// identity key it should verify under.
    pub fn validate(&self) -> Result<(), ProtoError> {
        if self.signed_pre_key_pub.trim().is_empty() {
            return Err(ProtoError::InvalidField {
                field: "signedPreKeyPub",
                reason: "empty".into(),
            });
        }
        if self.signed_pre_key_signature.trim().is_empty() {
            return Err(ProtoError::InvalidField {
                field: "signedPreKeySignature",
                reason: "empty".into(),
            });
        }
        let mut seen = HashSet::new();
        for key in &self.one_time_pre_keys {
            if key.public_key.trim().is_empty() {
                return Err(ProtoError::InvalidField {
                    field: "oneTimePreKeys",
                    reason: format!("key {} has an empty pub", key.id),
                });
            }
            if !seen.insert(key.id) {
                return Err(ProtoError::InvalidField {
                    field: "oneTimePreKeys",
                    reason: format!("duplicate id {}", key.id),
                });
            }
        }
        Ok(())
    }
}
