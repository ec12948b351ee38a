//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM.
//! Key size: 32 bytes.  IV: 12 bytes (random per call).  Tag: 16 bytes.
//!
//! The tag is kept detached from the ciphertext so the envelope can carry
//! `ivB64`, `ciphertextB64` and `authTagB64` as separate fields.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Output of one encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` under a 32-byte key with a fresh random IV.
/// `aad` — additional associated data (authenticated but not encrypted).
pub fn encrypt(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<SealedBox, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut combined = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    // aes-gcm appends the tag; split it off
    let split = combined
        .len()
        .checked_sub(TAG_LEN)
        .ok_or(CryptoError::AeadEncrypt)?;
    let tag_bytes = combined.split_off(split);

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&nonce);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok(SealedBox {
        iv,
        ciphertext: combined,
        tag,
    })
}

/// Decrypt a sealed box. Any mismatch in key, IV, ciphertext, tag or `aad`
/// fails closed with `AeadDecrypt`; no partial plaintext is released.
pub fn decrypt(
    key: &[u8; 32],
    sealed: &SealedBox,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&sealed.iv),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}
