//! danaid_proto — Wire and storage types for Danaid Chat
//!
//! Everything here is JSON with camelCase field names. Field order inside
//! each struct is part of the format: signed and authenticated byte strings
//! are produced by serialising these structs as-is.
//!
//! # Modules
//! - `account`  — Account record and the signed field set
//! - `envelope` — Encrypted message envelope and its associated data
//! - `api`      — Register / login request and response bodies
//! - `prekey`   — Optional prekey bundle published at registration
//! - `error`    — Protocol error type

pub mod account;
pub mod api;
pub mod envelope;
pub mod error;
pub mod prekey;

pub use account::{validate_username, AccountFields, AccountRecord};
pub use envelope::{AssociatedData, MessageEnvelope, MessageHeader, PROTOCOL_VERSION};
pub use error::ProtoError;
pub use prekey::{OneTimePreKey, PrekeyBundle};
