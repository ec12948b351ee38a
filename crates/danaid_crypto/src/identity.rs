//! Identity key management
//!
//! Each *user* has one long-term `IdentityKeyPair` (Ed25519). The private half
//! never leaves the client; the public half is stored in the account record
//! as SPKI PEM text and is what login challenges are verified against.
//!
//! The server's integrity key (used to seal account records) is the same
//! key type, persisted as a PKCS#8 / SPKI PEM pair.
//!
//! Signatures travel as standard base64 of the 64 raw Ed25519 bytes.

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::codec::{b64_decode_array, b64_encode};
use crate::error::CryptoError;
use crate::hash::identity_fingerprint;

pub const SIGNATURE_LEN: usize = 64;

// ── Public key ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPublicKey {
    key: VerifyingKey,
}

impl IdentityPublicKey {
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_public_key_pem(pem.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("public key PEM: {e}")))?;
        Ok(Self { key })
    }

    pub fn to_pem(&self) -> Result<String, CryptoError> {
        self.key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(format!("public key PEM: {e}")))
    }

    /// Fingerprint of the canonical PEM encoding of this key.
    pub fn fingerprint(&self) -> Result<String, CryptoError> {
        Ok(identity_fingerprint(&self.to_pem()?))
    }

    pub fn verify(&self, msg: &[u8], sig: &[u8; SIGNATURE_LEN]) -> Result<(), CryptoError> {
        let sig = Signature::from_bytes(sig);
        self.key
            .verify_strict(msg, &sig)
            .map_err(|_| CryptoError::SignatureVerification)
    }

    /// Verify a base64 signature. Malformed base64 or a wrong length counts
    /// as a failed verification, never as a pass.
    pub fn verify_b64(&self, msg: &[u8], sig_b64: &str) -> Result<(), CryptoError> {
        let sig = b64_decode_array::<SIGNATURE_LEN>(sig_b64)
            .map_err(|_| CryptoError::SignatureVerification)?;
        self.verify(msg, &sig)
    }
}

// ── Key pair ──────────────────────────────────────────────────────────────────

/// Long-term signing key. `SigningKey` clears its secret on drop.
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_pkcs8_pem(pem.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("private key PEM: {e}")))?;
        Ok(Self { signing_key })
    }

    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        let pem = self
            .signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyGeneration(format!("private key PEM: {e}")))?;
        Ok(Zeroizing::new(pem.as_str().to_owned()))
    }

    pub fn public(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            key: self.signing_key.verifying_key(),
        }
    }

    pub fn public_pem(&self) -> Result<String, CryptoError> {
        self.public().to_pem()
    }

    pub fn sign(&self, msg: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(msg).to_bytes()
    }

    pub fn sign_b64(&self, msg: &[u8]) -> String {
        b64_encode(self.sign(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_roundtrip_keeps_the_key() {
        let pair = IdentityKeyPair::generate();
        let private_pem = pair.to_pkcs8_pem().unwrap();
        assert!(private_pem.contains("BEGIN PRIVATE KEY"));

        let restored = IdentityKeyPair::from_pkcs8_pem(&private_pem).unwrap();
        assert_eq!(restored.public(), pair.public());

        let public_pem = pair.public_pem().unwrap();
        assert!(public_pem.contains("BEGIN PUBLIC KEY"));
        assert!(!public_pem.contains('\r') && !private_pem.contains('\r'));
        assert_eq!(IdentityPublicKey::from_pem(&public_pem).unwrap(), pair.public());
    }

    #[test]
    fn sign_and_verify_b64() {
        let pair = IdentityKeyPair::generate();
        let sig = pair.sign_b64(b"nonce-text");
        pair.public().verify_b64(b"nonce-text", &sig).unwrap();
        assert!(pair.public().verify_b64(b"other-text", &sig).is_err());
    }

    #[test]
    fn foreign_key_is_rejected() {
        let alice = IdentityKeyPair::generate();
        let mallory = IdentityKeyPair::generate();
        let sig = mallory.sign_b64(b"challenge");
        assert!(matches!(
            alice.public().verify_b64(b"challenge", &sig),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn malformed_signature_never_verifies() {
        let pair = IdentityKeyPair::generate();
        assert!(pair.public().verify_b64(b"m", "").is_err());
        assert!(pair.public().verify_b64(b"m", "!!!").is_err());
        assert!(pair.public().verify_b64(b"m", &b64_encode([0u8; 63])).is_err());
    }

    #[test]
    fn garbage_pem_is_invalid_key() {
        assert!(matches!(
            IdentityPublicKey::from_pem("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----"),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(IdentityKeyPair::from_pkcs8_pem("not a pem").is_err());
    }

    #[test]
    fn fingerprint_tracks_the_pem() {
        let pair = IdentityKeyPair::generate();
        let fp = pair.public().fingerprint().unwrap();
        assert_eq!(fp, identity_fingerprint(&pair.public_pem().unwrap()));
    }
}
