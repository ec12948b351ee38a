//! danaid_auth — Server-side trust layer for Danaid Chat
//!
//! # Modules
//! - `config`    — paths, TTLs and the token secret
//! - `signer`    — integrity signatures over stored account records
//! - `challenge` — single-use, time-bounded login challenges
//! - `token`     — HMAC-signed bearer credentials
//! - `store`     — account persistence (in-memory and JSON files)
//! - `protocol`  — registration and the two-phase challenge-response login
//! - `error`     — error taxonomy shared by the modules above

pub mod challenge;
pub mod config;
pub mod error;
pub mod protocol;
pub mod signer;
pub mod store;
pub mod token;

pub use challenge::{Challenge, ChallengeStore};
pub use config::AuthConfig;
pub use error::{AuthError, AuthErrorKind, StoreError};
pub use protocol::AuthenticationProtocol;
pub use signer::IntegritySigner;
pub use store::{AccountStore, JsonFileAccountStore, MemoryAccountStore};
pub use token::{TokenClaims, TokenIssuer};
