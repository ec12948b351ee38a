//! danaid_crypto — Danaid Chat cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize chain keys and message keys on drop.
//! - Ratchet steps are pure: they return the next chain state instead of
//!   mutating it, so a failed decrypt never moves a live chain.
//!
//! # Module layout
//! - `codec`    — base64 text <-> bytes helpers (standard alphabet, padded)
//! - `hash`     — SHA-256 hashing and identity-key fingerprints
//! - `kdf`      — hash-chain KDF, pair root key, Argon2id password keys
//! - `aead`     — AES-256-GCM encrypt/decrypt with detached tag
//! - `identity` — Ed25519 identity / server keys in PEM form
//! - `ratchet`  — per-conversation symmetric key ratchet
//! - `session`  — per-friend session cache for the logged-in user
//! - `error`    — unified error type

pub mod aead;
pub mod codec;
pub mod error;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod ratchet;
pub mod session;

pub use error::CryptoError;
pub use ratchet::{ChainState, MessageKey, RatchetSession, Role};
pub use session::SessionManager;
