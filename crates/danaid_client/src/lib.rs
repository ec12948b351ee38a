//! danaid_client — Client side of Danaid Chat
//!
//! - `identity`  — identity key handling, password keys, register/login bodies
//! - `messenger` — per-friend encryption and decryption of message envelopes
//! - `error`     — client error type
//!
//! The client never sends the password: the server only ever sees the
//! Argon2id-derived key and signatures made with the identity key.

pub mod error;
pub mod identity;
pub mod messenger;

pub use error::ClientError;
pub use identity::{derive_password_key, ClientIdentity};
pub use messenger::Messenger;
