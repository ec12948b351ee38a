//! SHA-256 utilities
//!
//! - Raw digests for the hash-chain KDF and the pair root key
//! - Identity-key fingerprints ("safety numbers")
//! - Constant-time byte comparison

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of `parts`, without an intermediate buffer.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Fingerprint of an identity public key: lowercase hex SHA-256 of the PEM
/// text exactly as stored. Stable for the lifetime of the key.
pub fn identity_fingerprint(public_key_pem: &str) -> String {
    hex::encode(sha256(public_key_pem.as_bytes()))
}

/// Fingerprint grouped in blocks of 4 hex chars for side-by-side comparison.
///
/// Example: "3f2a 9c01 …"
pub fn display_fingerprint(fingerprint_hex: &str) -> String {
    fingerprint_hex
        .as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Constant-time equality over raw bytes.
///
/// Unequal lengths return `false` after the length check alone; equal
/// lengths are compared without an early exit.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn concat_matches_single_buffer() {
        assert_eq!(sha256_concat(&[b"ab".as_slice(), b"c".as_slice()]), sha256(b"abc"));
    }

    #[test]
    fn fingerprint_is_hex_of_pem_text() {
        let pem = "-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n";
        let fp = identity_fingerprint(pem);
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, identity_fingerprint(pem));
        assert_ne!(fp, identity_fingerprint(&pem.replace('A', "B")));
    }

    #[test]
    fn display_groups_by_four() {
        assert_eq!(display_fingerprint("abcdef012345"), "abcd ef01 2345");
    }

    #[test]
    fn constant_time_eq_semantics() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"sama"));
        assert!(!constant_time_eq(b"short", b"longer"));
        assert!(constant_time_eq(b"", b""));
    }
}
