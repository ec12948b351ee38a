//! Register / login request and response bodies.
//! These map directly to JSON bodies on the wire.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::prekey::PrekeyBundle;

// ── Registration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    /// Base64 password-derived key; the password never leaves the client.
    pub derived_key_b64: String,
    pub public_key_pem: String,
    /// Signature by the new identity key over `registration_payload`, or over
    /// `RegistrationClaims::to_bytes` when no payload is sent.
    pub client_signature_b64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_payload: Option<String>,
    /// Stored in the signed record when present. Its signed prekey must
    /// verify under `public_key_pem`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prekey_bundle: Option<PrekeyBundle>,
}

/// The statement a registering client signs by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationClaims<'a> {
    pub username: &'a str,
    pub derived_key_b64: &'a str,
    pub public_key_pem: &'a str,
}

impl RegistrationClaims<'_> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(serde_json::to_vec(self)?)
    }
}

impl RegisterRequest {
    pub fn claims(&self) -> RegistrationClaims<'_> {
        RegistrationClaims {
            username: &self.username,
            derived_key_b64: &self.derived_key_b64,
            public_key_pem: &self.public_key_pem,
        }
    }

    /// Exact bytes the client signature must cover.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        match &self.registration_payload {
            Some(payload) => Ok(payload.as_bytes().to_vec()),
            None => self.claims().to_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub username: String,
    pub identity_key_fingerprint: String,
    pub has_prekey_bundle: bool,
}

// ── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStartRequest {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStartResponse {
    pub challenge_id: String,
    /// The client signs this base64 text itself, not the decoded bytes.
    pub nonce_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginFinishRequest {
    pub username: String,
    pub derived_key_b64: String,
    pub challenge_id: String,
    pub challenge_signature_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginFinishResponse {
    pub username: String,
    /// Bearer credential.
    pub token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub identity_key_fingerprint: String,
}
