//! Base64 helpers.
//!
//! Every byte string that crosses the wire or lands in a JSON file (nonces,
//! IVs, ciphertexts, tags, signatures, derived keys) is encoded with the
//! standard, padded alphabet so it matches what browsers produce with `btoa`.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::CryptoError;

pub fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

pub fn b64_decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(STANDARD.decode(text)?)
}

/// Decode base64 into a fixed-size array, rejecting any other length.
pub fn b64_decode_array<const N: usize>(text: &str) -> Result<[u8; N], CryptoError> {
    let bytes = b64_decode(text)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidEncoding(format!("expected {N} bytes, got {len}")))
}
