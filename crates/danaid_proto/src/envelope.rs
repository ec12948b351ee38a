//! Encrypted message envelope — what gets stored and relayed.
//!
//! ```json
//! {
//!   "header": { "n": 1, "pn": 0, "timestamp": 1700000000000 },
//!   "ivB64": "...", "ciphertextB64": "...", "authTagB64": "...",
//!   "ad": { "version": 2, "sessionId": "sess-alice-bob-...", "from": "alice",
//!           "to": "bob", "msgIndex": 1, "sentAt": 1700000000000 }
//! }
//! ```
//!
//! `ad` travels in the clear and is bound into the AEAD tag, so any edit to
//! it makes decryption fail.

use serde::{Deserialize, Serialize};

use danaid_crypto::aead::{SealedBox, IV_LEN, TAG_LEN};
use danaid_crypto::codec::{b64_decode, b64_decode_array, b64_encode};

use crate::error::ProtoError;

/// Associated-data format version.
pub const PROTOCOL_VERSION: u32 = 2;

/// Ratchet header: message index (1-based), previous chain length, send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub n: u64,
    pub pn: u64,
    /// Unix millis.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedData {
    pub version: u32,
    pub session_id: String,
    pub from: String,
    pub to: String,
    pub msg_index: u64,
    /// Unix millis.
    pub sent_at: i64,
}

impl AssociatedData {
    /// Deterministic serialisation bound into the AEAD tag. Re-serialising a
    /// parsed value yields the same bytes, whatever whitespace or key order
    /// the envelope arrived with.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub header: MessageHeader,
    pub iv_b64: String,
    pub ciphertext_b64: String,
    pub auth_tag_b64: String,
    pub ad: AssociatedData,
}

impl MessageEnvelope {
    pub fn from_sealed(header: MessageHeader, sealed: &SealedBox, ad: AssociatedData) -> Self {
        Self {
            header,
            iv_b64: b64_encode(sealed.iv),
            ciphertext_b64: b64_encode(&sealed.ciphertext),
            auth_tag_b64: b64_encode(sealed.tag),
            ad,
        }
    }

    /// Decode the base64 parts. IV and tag lengths are checked here.
    pub fn sealed_box(&self) -> Result<SealedBox, ProtoError> {
        let iv = b64_decode_array::<IV_LEN>(&self.iv_b64).map_err(|e| ProtoError::InvalidField {
            field: "ivB64",
            reason: e.to_string(),
        })?;
        let ciphertext = b64_decode(&self.ciphertext_b64).map_err(|e| ProtoError::InvalidField {
            field: "ciphertextB64",
            reason: e.to_string(),
        })?;
        let tag = b64_decode_array::<TAG_LEN>(&self.auth_tag_b64).map_err(|e| {
            ProtoError::InvalidField {
                field: "authTagB64",
                reason: e.to_string(),
            }
        })?;
        Ok(SealedBox { iv, ciphertext, tag })
    }

    pub fn to_json(&self) -> Result<String, ProtoError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(json)?)
    }
}
