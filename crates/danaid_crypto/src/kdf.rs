//! Key derivation functions
//!
//! `kdf` — the hash-chain KDF used by the ratchet:
//!   KDF(key, label) = SHA256(key || label)
//!
//! `pair_root_key` — the deterministic per-conversation root key:
//!   SHA256("ROOT|" || min(a, b) || "|" || max(a, b))
//!   This is a public function of both usernames, NOT a shared secret.
//!
//! `password_key` — Argon2id, derives the 32-byte key a client presents at
//!   login instead of the password.

use argon2::{Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::{error::CryptoError, hash::sha256_concat};

pub const KEY_LEN: usize = 32;

// ── Hash-chain KDF ────────────────────────────────────────────────────────────

pub fn kdf(key: &[u8; KEY_LEN], label: &str) -> [u8; KEY_LEN] {
    sha256_concat(&[key.as_slice(), label.as_bytes()])
}

/// Sort a username pair; the first element takes role A.
pub fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Order-independent root key for the conversation between `a` and `b`.
pub fn pair_root_key(a: &str, b: &str) -> [u8; KEY_LEN] {
    let (first, second) = sorted_pair(a, b);
    let context = format!("ROOT|{first}|{second}");
    sha256_concat(&[context.as_bytes()])
}

pub fn random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

// ── Password key (Argon2id) ───────────────────────────────────────────────────

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordKdfParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for PasswordKdfParams {
    /// Tuned for interactive (desktop/browser) use.
    fn default() -> Self {
        Self {
            m_cost_kib: 64 * 1024,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

/// Derive the login key for `username` from `password`.
///
/// The salt is bound to the username so two accounts sharing a password
/// still present different keys; it is not secret.
pub fn password_key(
    password: &[u8],
    username: &str,
    params: PasswordKdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let params = Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

    let salt_digest = sha256_concat(&[b"danaid-password-salt-v1|".as_slice(), username.as_bytes()]);
    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, &salt_digest[..16], &mut output[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn light() -> PasswordKdfParams {
        PasswordKdfParams {
            m_cost_kib: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn kdf_is_sha256_of_key_then_label() {
        let key = [9u8; 32];
        let mut buf = key.to_vec();
        buf.extend_from_slice(b"CHAIN_NEXT");
        assert_eq!(kdf(&key, "CHAIN_NEXT"), sha256(&buf));
    }

    #[test]
    fn root_key_is_order_independent() {
        assert_eq!(pair_root_key("alice", "bob"), pair_root_key("bob", "alice"));
        assert_eq!(pair_root_key("alice", "bob"), sha256(b"ROOT|alice|bob"));
        assert_ne!(pair_root_key("alice", "bob"), pair_root_key("alice", "carol"));
    }

    #[test]
    fn password_key_is_deterministic_and_salted_by_username() {
        let a1 = password_key(b"hunter2", "alice", light()).unwrap();
        let a2 = password_key(b"hunter2", "alice", light()).unwrap();
        let b = password_key(b"hunter2", "bob", light()).unwrap();
        assert_eq!(*a1, *a2);
        assert_ne!(*a1, *b);
    }

    #[test]
    fn invalid_params_are_reported() {
        let bad = PasswordKdfParams {
            m_cost_kib: 1,
            t_cost: 0,
            p_cost: 1,
        };
        assert!(matches!(
            password_key(b"pw", "alice", bad),
            Err(CryptoError::KeyDerivation(_))
        ));
    }
}
